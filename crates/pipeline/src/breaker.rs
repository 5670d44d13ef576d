//! Per-stage circuit breaker. A degraded downstream stage must not consume
//! the full retry budget of every incoming request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// What the breaker allows for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed: normal call with the full retry budget.
    Allowed,
    /// Half-open: exactly one probe attempt, no retries.
    Probe,
    /// Circuit open: short-circuit, no network attempt.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before one probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerSlot {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerSlot {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probe_in_flight: false,
        }
    }
}

/// Shared breaker state for all stages. Injected into the orchestrator
/// rather than living as a module-level singleton, so tests (and the health
/// endpoint) can reach and reset it deterministically.
pub struct BreakerRegistry {
    config: BreakerConfig,
    slots: Mutex<HashMap<String, BreakerSlot>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, stage: &str) -> Admission {
        let Ok(mut slots) = self.slots.lock() else {
            return Admission::Allowed;
        };
        let slot = slots
            .entry(stage.to_string())
            .or_insert_with(BreakerSlot::new);

        match slot.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let cooled_down = slot
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.config.reset_timeout);
                if cooled_down {
                    slot.state = CircuitState::HalfOpen;
                    slot.probe_in_flight = true;
                    log::info!("circuit for stage {stage} half-open, probing");
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if slot.probe_in_flight {
                    Admission::Rejected
                } else {
                    slot.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    pub fn on_success(&self, stage: &str) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        let slot = slots
            .entry(stage.to_string())
            .or_insert_with(BreakerSlot::new);
        if slot.state != CircuitState::Closed {
            log::info!("circuit for stage {stage} closed");
        }
        slot.state = CircuitState::Closed;
        slot.consecutive_failures = 0;
        slot.probe_in_flight = false;
    }

    pub fn on_failure(&self, stage: &str) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        let slot = slots
            .entry(stage.to_string())
            .or_insert_with(BreakerSlot::new);
        slot.last_failure = Some(Instant::now());

        match slot.state {
            CircuitState::Closed => {
                slot.consecutive_failures += 1;
                if slot.consecutive_failures >= self.config.failure_threshold {
                    slot.state = CircuitState::Open;
                    log::warn!(
                        "circuit for stage {stage} opened after {} consecutive failures",
                        slot.consecutive_failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Failed probe: back to open for another cooldown.
                slot.state = CircuitState::Open;
                slot.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    #[must_use]
    pub fn state(&self, stage: &str) -> CircuitState {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(stage).map(|slot| slot.state))
            .unwrap_or(CircuitState::Closed)
    }

    /// Drop all breaker state. Test hook.
    pub fn reset(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, reset_ms: u64) -> BreakerRegistry {
        BreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
        })
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let breakers = registry(3, 60_000);
        assert_eq!(breakers.try_acquire("ranker"), Admission::Allowed);
        breakers.on_failure("ranker");
        breakers.on_failure("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Closed);
        breakers.on_failure("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Open);
        assert_eq!(breakers.try_acquire("ranker"), Admission::Rejected);
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let breakers = registry(3, 60_000);
        breakers.on_failure("ranker");
        breakers.on_failure("ranker");
        breakers.on_success("ranker");
        breakers.on_failure("ranker");
        breakers.on_failure("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Closed);
    }

    #[test]
    fn exactly_one_probe_after_cooldown() {
        let breakers = registry(1, 10);
        breakers.on_failure("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Open);
        assert_eq!(breakers.try_acquire("ranker"), Admission::Rejected);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breakers.try_acquire("ranker"), Admission::Probe);
        // A second caller while the probe is in flight is still rejected.
        assert_eq!(breakers.try_acquire("ranker"), Admission::Rejected);
    }

    #[test]
    fn probe_success_closes_the_circuit() {
        let breakers = registry(1, 10);
        breakers.on_failure("ranker");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breakers.try_acquire("ranker"), Admission::Probe);
        breakers.on_success("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Closed);
        assert_eq!(breakers.try_acquire("ranker"), Admission::Allowed);
    }

    #[test]
    fn probe_failure_reopens_the_circuit() {
        let breakers = registry(1, 10);
        breakers.on_failure("ranker");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breakers.try_acquire("ranker"), Admission::Probe);
        breakers.on_failure("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Open);
        assert_eq!(breakers.try_acquire("ranker"), Admission::Rejected);
    }

    #[test]
    fn stages_are_isolated() {
        let breakers = registry(1, 60_000);
        breakers.on_failure("ranker");
        assert_eq!(breakers.state("ranker"), CircuitState::Open);
        assert_eq!(breakers.try_acquire("evaluator"), Admission::Allowed);
    }

    #[test]
    fn reset_clears_everything() {
        let breakers = registry(1, 60_000);
        breakers.on_failure("ranker");
        breakers.reset();
        assert_eq!(breakers.state("ranker"), CircuitState::Closed);
    }
}
