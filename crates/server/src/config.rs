//! Environment-first configuration with baked-in defaults. Every knob has a
//! `DECISION_*` variable; absent or unparsable values fall back silently to
//! the default so a bare `decision-finder serve` always starts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use decision_pipeline::{BreakerConfig, PipelineConfig, RetryConfig, StageEndpoint, StageEndpoints};
use decision_protocol::StageKind;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DB: &str = "decisions.db";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Prometheus exporter port; `None` disables the exporter.
    pub metrics_port: Option<u16>,
    pub db_path: PathBuf,
    pub endpoints: StageEndpoints,
    pub pipeline: PipelineConfig,
    pub breaker: BreakerConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind = env_string("DECISION_BIND")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| DEFAULT_BIND.parse().expect("default bind address is valid"));

        let retry = RetryConfig {
            max_attempts: env_u32("DECISION_RETRY_MAX_ATTEMPTS")
                .unwrap_or(RetryConfig::default().max_attempts),
            initial_delay: duration_from_env_ms("DECISION_RETRY_INITIAL_MS")
                .unwrap_or(RetryConfig::default().initial_delay),
            multiplier: env_f64("DECISION_RETRY_MULTIPLIER")
                .unwrap_or(RetryConfig::default().multiplier),
            max_delay: duration_from_env_ms("DECISION_RETRY_MAX_DELAY_MS")
                .unwrap_or(RetryConfig::default().max_delay),
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            retry,
            per_call_timeout: duration_from_env_ms("DECISION_STAGE_TIMEOUT_MS")
                .unwrap_or(defaults.per_call_timeout),
            pipeline_timeout: duration_from_env_ms("DECISION_PIPELINE_TIMEOUT_MS")
                .unwrap_or(defaults.pipeline_timeout),
            threshold_low: env_f32("DECISION_CONFIDENCE_THRESHOLD")
                .filter(|t| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.threshold_low),
        };

        let breaker = BreakerConfig {
            failure_threshold: env_u32("DECISION_BREAKER_THRESHOLD")
                .unwrap_or(BreakerConfig::default().failure_threshold),
            reset_timeout: duration_from_env_ms("DECISION_BREAKER_RESET_MS")
                .unwrap_or(BreakerConfig::default().reset_timeout),
        };

        Self {
            bind,
            metrics_port: env_u32("DECISION_METRICS_PORT").and_then(|p| u16::try_from(p).ok()),
            db_path: env_string("DECISION_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB)),
            endpoints: endpoints_from_env(),
            pipeline,
            breaker,
        }
    }
}

fn endpoints_from_env() -> StageEndpoints {
    StageEndpoints {
        clarifier: stage_from_env(StageKind::Clarifier, "DECISION_CLARIFIER_URL"),
        evaluator: stage_from_env(StageKind::Evaluator, "DECISION_EVALUATOR_URL"),
        ranker: stage_from_env(StageKind::Ranker, "DECISION_RANKER_URL"),
        formatter: stage_from_env(StageKind::Formatter, "DECISION_FORMATTER_URL"),
    }
}

fn stage_from_env(kind: StageKind, var: &str) -> Option<StageEndpoint> {
    env_string(var).map(|url| StageEndpoint::new(kind, url))
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn duration_from_env_ms(var: &str) -> Option<Duration> {
    env_string(var)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn env_u32(var: &str) -> Option<u32> {
    env_string(var).and_then(|v| v.parse().ok())
}

fn env_f32(var: &str) -> Option<f32> {
    env_string(var).and_then(|v| v.parse().ok())
}

fn env_f64(var: &str) -> Option<f64> {
    env_string(var).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var reads are process-global, so these tests pick unique names.

    #[test]
    fn defaults_apply_without_env() {
        std::env::remove_var("DECISION_BIND");
        let config = ServerConfig::from_env();
        assert_eq!(config.bind, DEFAULT_BIND.parse().unwrap());
        assert_eq!(config.pipeline.threshold_low, 0.7);
    }

    #[test]
    fn invalid_durations_fall_back() {
        std::env::set_var("DECISION_TEST_BAD_MS", "not-a-number");
        assert_eq!(duration_from_env_ms("DECISION_TEST_BAD_MS"), None);
        std::env::set_var("DECISION_TEST_ZERO_MS", "0");
        assert_eq!(duration_from_env_ms("DECISION_TEST_ZERO_MS"), None);
        std::env::set_var("DECISION_TEST_GOOD_MS", "250");
        assert_eq!(
            duration_from_env_ms("DECISION_TEST_GOOD_MS"),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn stage_urls_build_endpoints() {
        std::env::set_var("DECISION_TEST_STAGE_URL", "http://localhost:9100");
        let endpoint = stage_from_env(StageKind::Ranker, "DECISION_TEST_STAGE_URL").unwrap();
        assert_eq!(endpoint.base_url, "http://localhost:9100");
        assert!(stage_from_env(StageKind::Ranker, "DECISION_TEST_STAGE_MISSING").is_none());
    }
}
