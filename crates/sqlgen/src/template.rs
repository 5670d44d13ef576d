//! Static template registry. Templates are declared once, never mutated, and
//! selection is a pure function of (intent type, present entity keys).

use decision_protocol::{EntityKey, IntentType, ResultShape};

use decision_protocol::EntityKey::*;

#[derive(Debug, Clone, Copy)]
pub struct QueryTemplate {
    pub id: &'static str,
    pub intent: IntentType,
    pub required: &'static [EntityKey],
    pub shape: ResultShape,
}

/// Declared roughly most-specific-first for readability; selection does not
/// depend on this order except as the final tie-break.
pub const TEMPLATES: &[QueryTemplate] = &[
    // Search family: full rows, newest first.
    QueryTemplate {
        id: "search_topic_government_date",
        intent: IntentType::Search,
        required: &[Topic, GovernmentNumber, DateRange],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_topic_government",
        intent: IntentType::Search,
        required: &[Topic, GovernmentNumber],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_topic_date",
        intent: IntentType::Search,
        required: &[Topic, DateRange],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_government_date",
        intent: IntentType::Search,
        required: &[GovernmentNumber, DateRange],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_topic",
        intent: IntentType::Search,
        required: &[Topic],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_government",
        intent: IntentType::Search,
        required: &[GovernmentNumber],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_date",
        intent: IntentType::Search,
        required: &[DateRange],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_prime_minister",
        intent: IntentType::Search,
        required: &[PrimeMinister],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_ministry",
        intent: IntentType::Search,
        required: &[Ministries],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "search_decision_type",
        intent: IntentType::Search,
        required: &[DecisionType],
        shape: ResultShape::Records,
    },
    // Count family: a single integer, no row transfer.
    QueryTemplate {
        id: "count_topic_government_date",
        intent: IntentType::Count,
        required: &[Topic, GovernmentNumber, DateRange],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_topic_government",
        intent: IntentType::Count,
        required: &[Topic, GovernmentNumber],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_topic_date",
        intent: IntentType::Count,
        required: &[Topic, DateRange],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_government_date",
        intent: IntentType::Count,
        required: &[GovernmentNumber, DateRange],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_topic",
        intent: IntentType::Count,
        required: &[Topic],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_government",
        intent: IntentType::Count,
        required: &[GovernmentNumber],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_date",
        intent: IntentType::Count,
        required: &[DateRange],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_prime_minister",
        intent: IntentType::Count,
        required: &[PrimeMinister],
        shape: ResultShape::CountScalar,
    },
    QueryTemplate {
        id: "count_ministry",
        intent: IntentType::Count,
        required: &[Ministries],
        shape: ResultShape::CountScalar,
    },
    // Specific decision lookup.
    QueryTemplate {
        id: "specific_by_number_government",
        intent: IntentType::SpecificDecision,
        required: &[DecisionNumber, GovernmentNumber],
        shape: ResultShape::Records,
    },
    QueryTemplate {
        id: "specific_by_number",
        intent: IntentType::SpecificDecision,
        required: &[DecisionNumber],
        shape: ResultShape::Records,
    },
    // Comparison family: grouped counts.
    QueryTemplate {
        id: "compare_topic_by_government",
        intent: IntentType::Comparison,
        required: &[Topic],
        shape: ResultShape::GroupedCount,
    },
    QueryTemplate {
        id: "compare_by_year",
        intent: IntentType::Comparison,
        required: &[DateRange],
        shape: ResultShape::GroupedCount,
    },
    QueryTemplate {
        id: "compare_by_government",
        intent: IntentType::Comparison,
        required: &[],
        shape: ResultShape::GroupedCount,
    },
];

/// Most-specific-match-wins: largest fully-satisfied requirement set; at
/// equal specificity a template that filters by topic beats one that does
/// not (topic filters are more selective); remaining ties keep the first
/// declared template.
pub fn select(
    intent: IntentType,
    present: &[EntityKey],
) -> Option<&'static QueryTemplate> {
    let satisfied = |template: &QueryTemplate| {
        template
            .required
            .iter()
            .all(|key| present.contains(key))
    };

    let mut best: Option<&'static QueryTemplate> = None;
    for template in TEMPLATES {
        if template.intent != intent || !satisfied(template) {
            continue;
        }
        let better = match best {
            None => true,
            Some(current) => {
                template.required.len() > current.required.len()
                    || (template.required.len() == current.required.len()
                        && template.required.contains(&Topic)
                        && !current.required.contains(&Topic))
            }
        };
        if better {
            best = Some(template);
        }
    }
    best
}
