//! Confidence gate: AWAITING_INTENT → PROCEED | CLARIFY.

use decision_protocol::{Intent, IntentType, RoutingDecision, RoutingReason};

/// Threshold policy over a classified intent. Checks run in a fixed order so
/// each clarification reason is independently reachable and testable:
/// confidence first, then required entities, then unresolved relative time.
#[must_use]
pub fn route(intent: &Intent, threshold_low: f32) -> RoutingDecision {
    if intent.confidence < threshold_low {
        return RoutingDecision::clarify(RoutingReason::LowConfidence);
    }

    let missing = match intent.intent_type {
        IntentType::Count | IntentType::Search => !intent.entities.has_filterable(),
        IntentType::SpecificDecision => intent.entities.decision_number.is_none(),
        // Comparison degrades to an all-governments breakdown; general
        // questions and unclear text need nothing further here.
        IntentType::Comparison | IntentType::GeneralQuestion | IntentType::Unclear => false,
    };
    if missing {
        return RoutingDecision::clarify(RoutingReason::MissingEntities);
    }

    if intent.entities.relative_time.is_some() && intent.entities.date_range.is_none() {
        return RoutingDecision::clarify(RoutingReason::AmbiguousTime);
    }

    RoutingDecision::proceed()
}
