use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A positionally bound statement parameter. User-influenced values travel
/// exclusively through this type; the statement body never embeds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// Full decision rows.
    Records,
    /// A single COUNT(*) integer.
    CountScalar,
    /// (group key, count) pairs for comparison intents.
    GroupedCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedQuery {
    pub statement: String,
    pub params: Vec<SqlParam>,
    /// Template that produced the statement, or `"fallback"`.
    pub template_id: String,
    pub shape: ResultShape,
    /// Audit id: digest of the statement body, safe to expose in metadata.
    pub fingerprint: String,
}

/// Stable audit id for a statement body. Parameters are excluded on purpose:
/// two requests through the same template share a fingerprint.
#[must_use]
pub fn fingerprint_statement(statement: &str) -> String {
    let digest = Sha256::digest(statement.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// One row of the decision corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionRecord {
    pub id: i64,
    pub government_number: Option<i64>,
    pub decision_number: String,
    /// ISO date (YYYY-MM-DD) as stored.
    pub decision_date: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub operativity: Option<String>,
    #[serde(default)]
    pub tags_policy_area: Option<String>,
    #[serde(default)]
    pub tags_government_body: Option<String>,
    #[serde(default)]
    pub prime_minister: Option<String>,
    #[serde(default)]
    pub decision_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows(Vec<DecisionRecord>),
    CountValue(i64),
    GroupedCounts(Vec<GroupCount>),
}

impl QueryOutcome {
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::CountValue(_) => 1,
            Self::GroupedCounts(groups) => groups.len(),
        }
    }
}
