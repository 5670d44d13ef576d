use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// Retrieve matching decisions.
    Search,
    /// Statistical question, answered with a count instead of rows.
    Count,
    /// A single decision referenced by number.
    SpecificDecision,
    /// Compare decision activity across governments or years.
    Comparison,
    /// No recognizable intent signal.
    Unclear,
    /// Question about the corpus itself rather than its content.
    GeneralQuestion,
}

impl IntentType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Count => "count",
            Self::SpecificDecision => "specific_decision",
            Self::Comparison => "comparison",
            Self::Unclear => "unclear",
            Self::GeneralQuestion => "general_question",
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Operative,
    Declarative,
}

impl DecisionType {
    /// Value stored in the `operativity` column of the decision corpus.
    #[must_use]
    pub fn column_value(&self) -> &'static str {
        match self {
            Self::Operative => "אופרטיבית",
            Self::Declarative => "דקלרטיבית",
        }
    }
}

/// Inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The whole calendar year, Jan 1 through Dec 31.
    pub fn year(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
        Some(Self { start, end })
    }

    /// From Jan 1 of `year` through `today`.
    pub fn since_year(year: i32, today: NaiveDate) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        Some(Self { start, end: today })
    }
}

/// Slot an extracted entity occupies. Query templates declare their
/// requirements as sets of these keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    GovernmentNumber,
    Topic,
    DecisionNumber,
    DateRange,
    Ministries,
    PrimeMinister,
    DecisionType,
    Limit,
}

/// Recognized slots for one request. Absence is meaningful: an empty set on a
/// count or search intent drives clarification rather than an unfiltered scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntitySet {
    #[serde(default)]
    pub government_number: Option<u32>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub decision_number: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub ministries: Vec<String>,
    #[serde(default)]
    pub prime_minister: Option<String>,
    #[serde(default)]
    pub decision_type: Option<DecisionType>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Recognized but unresolved relative time phrase ("לאחרונה"). Never
    /// bound into a query; its presence routes to clarification.
    #[serde(default)]
    pub relative_time: Option<String>,
}

impl EntitySet {
    #[must_use]
    pub fn present_keys(&self) -> Vec<EntityKey> {
        let mut keys = Vec::new();
        if self.government_number.is_some() {
            keys.push(EntityKey::GovernmentNumber);
        }
        if self.topic.is_some() {
            keys.push(EntityKey::Topic);
        }
        if self.decision_number.is_some() {
            keys.push(EntityKey::DecisionNumber);
        }
        if self.date_range.is_some() {
            keys.push(EntityKey::DateRange);
        }
        if !self.ministries.is_empty() {
            keys.push(EntityKey::Ministries);
        }
        if self.prime_minister.is_some() {
            keys.push(EntityKey::PrimeMinister);
        }
        if self.decision_type.is_some() {
            keys.push(EntityKey::DecisionType);
        }
        if self.limit.is_some() {
            keys.push(EntityKey::Limit);
        }
        keys
    }

    /// True when at least one entity can narrow a query. `limit` and
    /// `relative_time` do not count: they shape output, not selection.
    #[must_use]
    pub fn has_filterable(&self) -> bool {
        self.government_number.is_some()
            || self.topic.is_some()
            || self.decision_number.is_some()
            || self.date_range.is_some()
            || !self.ministries.is_empty()
            || self.prime_minister.is_some()
            || self.decision_type.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_filterable() && self.limit.is_none() && self.relative_time.is_none()
    }
}

/// Classification of one free-text request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Intent {
    pub intent_type: IntentType,
    pub entities: EntitySet,
    pub confidence: f32,
    pub original_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    Direct,
    LowConfidence,
    MissingEntities,
    AmbiguousTime,
}

impl RoutingReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::LowConfidence => "low_confidence",
            Self::MissingEntities => "missing_entities",
            Self::AmbiguousTime => "ambiguous_time",
        }
    }
}

/// Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingDecision {
    pub proceed: bool,
    pub reason: RoutingReason,
}

impl RoutingDecision {
    #[must_use]
    pub fn proceed() -> Self {
        Self {
            proceed: true,
            reason: RoutingReason::Direct,
        }
    }

    #[must_use]
    pub fn clarify(reason: RoutingReason) -> Self {
        Self {
            proceed: false,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_keys_track_presence() {
        let mut entities = EntitySet::default();
        assert!(entities.is_empty());
        assert!(!entities.has_filterable());

        entities.government_number = Some(37);
        entities.topic = Some("חינוך".to_string());
        let keys = entities.present_keys();
        assert!(keys.contains(&EntityKey::GovernmentNumber));
        assert!(keys.contains(&EntityKey::Topic));
        assert!(entities.has_filterable());
    }

    #[test]
    fn limit_alone_is_not_filterable() {
        let entities = EntitySet {
            limit: Some(5),
            ..Default::default()
        };
        assert!(!entities.has_filterable());
        assert!(!entities.is_empty());
    }

    #[test]
    fn year_range_is_inclusive() {
        let range = DateRange::year(2024).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }
}
