//! One network call to a pipeline stage: timeout, classified retry with
//! exponential backoff, and the per-stage circuit breaker in front.

use std::sync::Arc;
use std::time::Duration;

use decision_protocol::StageKind;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::breaker::{Admission, BreakerRegistry};
use crate::error::StageError;

#[derive(Debug, Clone)]
pub struct StageEndpoint {
    pub kind: StageKind,
    pub base_url: String,
}

impl StageEndpoint {
    #[must_use]
    pub fn new(kind: StageKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
        }
    }

    fn process_url(&self) -> String {
        format!("{}/process", self.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

pub struct StageClient {
    http: reqwest::Client,
    retry: RetryConfig,
    per_call_timeout: Duration,
    breakers: Arc<BreakerRegistry>,
}

impl StageClient {
    #[must_use]
    pub fn new(
        retry: RetryConfig,
        per_call_timeout: Duration,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry,
            per_call_timeout,
            breakers,
        }
    }

    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Invoke `POST <base>/process`. Transient failures are retried with
    /// exponential backoff (`initial_delay × multiplier^(attempt-1)`, capped);
    /// non-transient failures are returned immediately. Each terminal outcome
    /// feeds the stage's circuit; an open circuit short-circuits here without
    /// touching the network.
    pub async fn invoke<Req, Resp>(
        &self,
        endpoint: &StageEndpoint,
        request: &Req,
    ) -> Result<Resp, StageError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let stage = endpoint.kind.as_str();
        let attempts = match self.breakers.try_acquire(stage) {
            Admission::Rejected => {
                return Err(StageError::CircuitOpen {
                    stage: stage.to_string(),
                })
            }
            Admission::Probe => 1,
            Admission::Allowed => self.retry.max_attempts.max(1),
        };

        let body = serde_json::to_value(request).map_err(|err| StageError::InvalidPayload {
            stage: stage.to_string(),
            message: err.to_string(),
        })?;

        let mut delay = self.retry.initial_delay;
        let mut last: Option<StageError> = None;
        for attempt in 1..=attempts {
            match self.attempt(endpoint, body.clone()).await {
                Ok(value) => {
                    self.breakers.on_success(stage);
                    return serde_json::from_value(value).map_err(|err| {
                        StageError::InvalidPayload {
                            stage: stage.to_string(),
                            message: err.to_string(),
                        }
                    });
                }
                Err(err) => {
                    log::warn!("stage {stage} attempt {attempt}/{attempts} failed: {err}");
                    if !err.is_transient() {
                        self.breakers.on_failure(stage);
                        return Err(err);
                    }
                    last = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay = next_delay(delay, &self.retry);
                    }
                }
            }
        }

        self.breakers.on_failure(stage);
        Err(StageError::Exhausted {
            stage: stage.to_string(),
            attempts,
            last: last.map(|err| err.to_string()).unwrap_or_default(),
        })
    }

    /// One HTTP attempt, run in a spawned task: if the caller disconnects and
    /// this future is dropped, the attempt still completes so breaker
    /// accounting stays accurate.
    async fn attempt(
        &self,
        endpoint: &StageEndpoint,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, StageError> {
        let stage = endpoint.kind.as_str().to_string();
        let url = endpoint.process_url();
        let http = self.http.clone();
        let timeout = self.per_call_timeout;

        let task = tokio::spawn(async move {
            let response = http
                .post(&url)
                .timeout(timeout)
                .json(&body)
                .send()
                .await
                .map_err(|err| classify(&stage, &err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(StageError::Http {
                    stage,
                    status: status.as_u16(),
                });
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|err| StageError::InvalidPayload {
                    stage,
                    message: err.to_string(),
                })
        });

        task.await.map_err(|err| StageError::Transport {
            stage: endpoint.kind.as_str().to_string(),
            message: format!("stage task failed: {err}"),
        })?
    }

    /// `GET <base>/health`, best effort with a short timeout.
    pub async fn health(&self, endpoint: &StageEndpoint) -> bool {
        self.http
            .get(endpoint.health_url())
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}

fn classify(stage: &str, err: &reqwest::Error) -> StageError {
    if err.is_timeout() {
        StageError::Timeout {
            stage: stage.to_string(),
        }
    } else {
        // Connection refused/reset and DNS failures land here.
        StageError::Transport {
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }
}

fn next_delay(current: Duration, retry: &RetryConfig) -> Duration {
    current.mul_f64(retry.multiplier).min(retry.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        let d1 = retry.initial_delay;
        let d2 = next_delay(d1, &retry);
        let d3 = next_delay(d2, &retry);
        assert_eq!(d2, Duration::from_millis(400));
        assert_eq!(d3, Duration::from_millis(500));
        assert_eq!(next_delay(d3, &retry), Duration::from_millis(500));
    }

    #[test]
    fn endpoint_urls_tolerate_trailing_slashes() {
        let endpoint = StageEndpoint::new(StageKind::Ranker, "http://localhost:9000/");
        assert_eq!(endpoint.process_url(), "http://localhost:9000/process");
        assert_eq!(endpoint.health_url(), "http://localhost:9000/health");
    }
}
