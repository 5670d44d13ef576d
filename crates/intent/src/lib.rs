//! Deterministic intent routing for Hebrew decision queries.
//!
//! Free text goes in; a typed [`Intent`] with a confidence score comes out,
//! and the gate decides whether the pipeline proceeds or asks one clarifying
//! question. Generating a syntactically valid but semantically wrong query is
//! worse than asking once, so anything ambiguous routes to clarification.

use chrono::{NaiveDate, Utc};
use decision_protocol::{EntitySet, Intent, IntentType, RoutingDecision};
use once_cell::sync::Lazy;
use regex::Regex;

mod extract;
mod gate;

pub use extract::extract_entities;
pub use gate::route;

static COUNT_SIGNAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)כמה(?:\s|$)|מספר\s+ה?החלטות|כמות\s+ה?החלטות").unwrap());
static COMPARE_SIGNAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"השווה|השוואה|בהשוואה|לעומת|הבדל\s+בין").unwrap());
static GENERAL_SIGNAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:מה\s+זה|מהי|מהו|מהן|הסבר|איך\s+עובד)").unwrap());

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Below this, routing always clarifies.
    pub threshold_low: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { threshold_low: 0.7 }
    }
}

pub struct IntentRouter {
    config: RouterConfig,
}

impl IntentRouter {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Classify free text into an immutable [`Intent`].
    #[must_use]
    pub fn classify(&self, text: &str) -> Intent {
        self.classify_at(text, Utc::now().date_naive())
    }

    /// Classification with an injected clock, for deterministic tests and
    /// for resolving "since YEAR" ranges.
    #[must_use]
    pub fn classify_at(&self, text: &str, today: NaiveDate) -> Intent {
        let entities = extract_entities(text, today);
        let intent_type = classify_type(text, &entities);
        let confidence = score(intent_type, &entities);

        log::debug!(
            "classified '{text}' as {intent_type} (confidence {confidence:.2}, entities: {:?})",
            entities.present_keys()
        );

        Intent {
            intent_type,
            entities,
            confidence,
            original_text: text.to_string(),
        }
    }

    /// Threshold policy over a classified intent.
    #[must_use]
    pub fn route(&self, intent: &Intent) -> RoutingDecision {
        gate::route(intent, self.config.threshold_low)
    }
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

fn classify_type(text: &str, entities: &EntitySet) -> IntentType {
    if COUNT_SIGNAL.is_match(text) {
        return IntentType::Count;
    }
    if COMPARE_SIGNAL.is_match(text) {
        return IntentType::Comparison;
    }
    if entities.decision_number.is_some() {
        return IntentType::SpecificDecision;
    }
    if GENERAL_SIGNAL.is_match(text) && !entities.has_filterable() {
        return IntentType::GeneralQuestion;
    }
    if entities.has_filterable() {
        return IntentType::Search;
    }
    IntentType::Unclear
}

/// Additive confidence heuristic. Explicit intent keywords start high enough
/// that a well-formed statistical question passes the gate even before any
/// entity bonus; unclear text stays firmly below it.
fn score(intent_type: IntentType, entities: &EntitySet) -> f32 {
    let base = match intent_type {
        IntentType::Count | IntentType::Comparison | IntentType::SpecificDecision => 0.70,
        IntentType::GeneralQuestion => 0.75,
        IntentType::Search => 0.45,
        IntentType::Unclear => 0.30,
    };

    let mut bonus = 0.0f32;
    if entities.decision_number.is_some() {
        bonus += 0.30;
    }
    if entities.topic.is_some() {
        bonus += 0.25;
    }
    if entities.government_number.is_some() {
        bonus += 0.25;
    }
    if entities.date_range.is_some() {
        bonus += 0.20;
    }
    if !entities.ministries.is_empty() {
        bonus += 0.25;
    }
    if entities.prime_minister.is_some() {
        bonus += 0.15;
    }
    if entities.decision_type.is_some() {
        bonus += 0.10;
    }

    (base + bonus).min(1.0)
}
