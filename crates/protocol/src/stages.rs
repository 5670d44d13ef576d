//! Wire contracts for the downstream pipeline stages. Each stage is an
//! independently deployable service exposing `POST <base>/process` with the
//! request/response pair below, plus `GET <base>/health`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::intent::{Intent, RoutingReason};
use crate::query::{DecisionRecord, GroupCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Clarifier,
    Evaluator,
    Ranker,
    Formatter,
}

impl StageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarifier => "clarifier",
            Self::Evaluator => "evaluator",
            Self::Ranker => "ranker",
            Self::Formatter => "formatter",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClarifyRequest {
    pub intent: Intent,
    pub reason: RoutingReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClarifyResponse {
    pub question: String,
    #[serde(default)]
    pub token_cost: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvaluateRequest {
    pub results: Vec<DecisionRecord>,
    pub intent: Intent,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvaluateResponse {
    /// Overall relevance of the result set to the question, 0..=1.
    pub relevance: f32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub token_cost: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankRequest {
    pub results: Vec<DecisionRecord>,
    pub intent: Intent,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankResponse {
    /// Permutation of input indices, best first. Indices out of range are
    /// ignored by the consumer; missing indices keep their original order.
    pub order: Vec<usize>,
    #[serde(default)]
    pub token_cost: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FormatRequest {
    pub results: Vec<DecisionRecord>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub groups: Vec<GroupCount>,
    pub intent: Intent,
    #[serde(default)]
    pub evaluation: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FormatResponse {
    pub text: String,
    #[serde(default)]
    pub token_cost: Option<u64>,
}

/// Liveness snapshot for one downstream stage, surfaced by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageHealth {
    pub stage: StageKind,
    pub reachable: bool,
    /// Circuit state label: "closed", "open" or "half_open".
    pub breaker: String,
}
