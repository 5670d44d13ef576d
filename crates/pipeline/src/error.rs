use thiserror::Error;

/// Failure of one stage invocation, after its own retry policy ran out.
#[derive(Error, Debug)]
pub enum StageError {
    /// Short-circuited without a network attempt.
    #[error("circuit open for stage {stage}")]
    CircuitOpen { stage: String },

    #[error("stage {stage} timed out")]
    Timeout { stage: String },

    #[error("transport error calling stage {stage}: {message}")]
    Transport { stage: String, message: String },

    #[error("stage {stage} returned HTTP {status}")]
    Http { stage: String, status: u16 },

    #[error("invalid payload from stage {stage}: {message}")]
    InvalidPayload { stage: String, message: String },

    #[error("stage {stage} failed after {attempts} attempts: {last}")]
    Exhausted {
        stage: String,
        attempts: u32,
        last: String,
    },
}

impl StageError {
    /// Transient errors are worth retrying: connection trouble, timeouts and
    /// gateway-class HTTP statuses. 4xx and malformed payloads are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Http { status, .. } => matches!(status, 502 | 503 | 504),
            Self::CircuitOpen { .. }
            | Self::InvalidPayload { .. }
            | Self::Exhausted { .. } => false,
        }
    }
}

/// Failure of one fallback strategy; the orchestrator advances the cascade.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] decision_sqlgen::GenerationError),

    #[error(transparent)]
    Store(#[from] decision_store::StoreError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("internal error: {0}")]
    Internal(String),
}
