//! Resilient multi-stage orchestration for decision queries.
//!
//! The orchestrator chains the intent router, the template SQL generator,
//! the decision store, and the downstream stages (clarifier, evaluator,
//! ranker, formatter) reached over HTTP with per-call timeouts, classified
//! retries and per-stage circuit breakers. Stage failures degrade the
//! answer; systemic failure falls back to the legacy single-pass engine and
//! finally to a static guidance message. The caller always gets a terminal
//! response.

mod breaker;
mod clarify;
mod error;
mod invoker;
mod orchestrator;
mod render;

pub use breaker::{Admission, BreakerConfig, BreakerRegistry, CircuitState};
pub use error::{PipelineError, StageError};
pub use invoker::{RetryConfig, StageClient, StageEndpoint};
pub use orchestrator::{Orchestrator, PipelineConfig, StageEndpoints};
