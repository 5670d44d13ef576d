use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod intent;
pub mod query;
pub mod stages;

pub use intent::{
    DateRange, DecisionType, EntityKey, EntitySet, Intent, IntentType, RoutingDecision,
    RoutingReason,
};
pub use query::{DecisionRecord, GeneratedQuery, GroupCount, QueryOutcome, ResultShape, SqlParam};
pub use stages::{
    ClarifyRequest, ClarifyResponse, EvaluateRequest, EvaluateResponse, FormatRequest,
    FormatResponse, RankRequest, RankResponse, StageHealth, StageKind,
};

pub const PROTOCOL_SCHEMA_VERSION: u32 = 1;

/// Structured error surfaced to API clients. Internal failure detail never
/// travels through this type; `hint` carries user-actionable guidance only.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct OutputPreferences {
    /// Cap on returned rows; clamped server-side.
    #[serde(default)]
    pub max_results: Option<u32>,
    /// Titles and dates only, no summaries.
    #[serde(default)]
    pub brief: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ResolveRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub output: OutputPreferences,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Answer {
    /// Final user-facing text (formatter prose, or a degraded local rendering).
    pub text: String,
    #[serde(default)]
    pub results: Vec<DecisionRecord>,
    #[serde(default)]
    pub count: Option<i64>,
    /// Set when the pipeline asked a clarifying question instead of answering.
    #[serde(default)]
    pub clarification: bool,
}

/// Per-stage outcome appended to the request trace.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct StageTiming {
    pub stage: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(default)]
    pub token_cost: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ResolveMeta {
    pub intent_type: IntentType,
    pub confidence: f32,
    pub entities: EntitySet,
    /// Audit fingerprint of the executed statement, never the SQL itself.
    #[serde(default)]
    pub query_id: Option<String>,
    pub stage_timings: Vec<StageTiming>,
    pub total_ms: u64,
    pub token_cost: u64,
    #[serde(default)]
    pub degraded_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ResolveResponse {
    pub success: bool,
    #[serde(default)]
    pub answer: Option<Answer>,
    #[serde(default)]
    pub error: Option<ErrorEnvelope>,
    pub meta: ResolveMeta,
}
