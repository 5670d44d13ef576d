use decision_protocol::query::fingerprint_statement;
use decision_protocol::{
    EntityKey, EntitySet, GeneratedQuery, Intent, ResultShape, SqlParam,
};
use decision_taxonomy::TagNormalizer;

use crate::error::{GenerationError, Result};
use crate::template::{select, QueryTemplate};

const TABLE: &str = "israeli_government_decisions";
const RECORD_COLUMNS: &str = "id, government_number, decision_number, decision_date, title, \
     summary, content, operativity, tags_policy_area, tags_government_body, prime_minister, \
     decision_url";
const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 50;

/// Collects positional parameters and hands out `?N` placeholders in order.
struct StatementBuilder {
    params: Vec<SqlParam>,
}

impl StatementBuilder {
    fn new() -> Self {
        Self { params: Vec::new() }
    }

    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }
}

/// Turns a routed [`Intent`] into a [`GeneratedQuery`]. Template first, then
/// the disjunctive multi-field fallback; topic values always pass through the
/// tag normalizer before binding.
pub struct QueryGenerator {
    normalizer: TagNormalizer,
}

impl QueryGenerator {
    #[must_use]
    pub fn new(normalizer: TagNormalizer) -> Self {
        Self { normalizer }
    }

    #[must_use]
    pub fn with_builtin_taxonomy() -> Self {
        Self::new(TagNormalizer::builtin())
    }

    pub fn build(&self, intent: &Intent) -> Result<GeneratedQuery> {
        let present = intent.entities.present_keys();
        let query = match select(intent.intent_type, &present) {
            Some(template) => self.build_from_template(template, &intent.entities),
            None => self.build_fallback(intent)?,
        };
        verify_parameterized(&query)?;
        log::debug!(
            "generated query {} (template {}, {} params)",
            query.fingerprint,
            query.template_id,
            query.params.len()
        );
        Ok(query)
    }

    fn build_from_template(
        &self,
        template: &'static QueryTemplate,
        entities: &EntitySet,
    ) -> GeneratedQuery {
        let mut builder = StatementBuilder::new();
        let mut clauses = Vec::with_capacity(template.required.len());

        for key in template.required {
            match key {
                EntityKey::GovernmentNumber => {
                    let n = i64::from(entities.government_number.unwrap_or_default());
                    let ph = builder.bind(SqlParam::Int(n));
                    clauses.push(format!("government_number = {ph}"));
                }
                EntityKey::Topic => {
                    let topic = entities.topic.as_deref().unwrap_or_default();
                    clauses.push(self.topic_predicate(&mut builder, topic));
                }
                EntityKey::DecisionNumber => {
                    let number = entities.decision_number.clone().unwrap_or_default();
                    let ph = builder.bind(SqlParam::Text(number));
                    clauses.push(format!("decision_number = {ph}"));
                }
                EntityKey::DateRange => {
                    // Inclusive on both ends.
                    let range = entities.date_range.expect("template requires date range");
                    let start = builder
                        .bind(SqlParam::Text(range.start.format("%Y-%m-%d").to_string()));
                    let end =
                        builder.bind(SqlParam::Text(range.end.format("%Y-%m-%d").to_string()));
                    clauses.push(format!("decision_date >= {start} AND decision_date <= {end}"));
                }
                EntityKey::Ministries => {
                    let mut alternatives = Vec::with_capacity(entities.ministries.len());
                    for ministry in &entities.ministries {
                        let ph = builder.bind(SqlParam::Text(ministry.clone()));
                        alternatives.push(format!("tags_government_body LIKE '%' || {ph} || '%'"));
                    }
                    clauses.push(format!("({})", alternatives.join(" OR ")));
                }
                EntityKey::PrimeMinister => {
                    let name = entities.prime_minister.clone().unwrap_or_default();
                    let ph = builder.bind(SqlParam::Text(name));
                    clauses.push(format!("prime_minister LIKE '%' || {ph} || '%'"));
                }
                EntityKey::DecisionType => {
                    let value = entities
                        .decision_type
                        .map(|t| t.column_value().to_string())
                        .unwrap_or_default();
                    let ph = builder.bind(SqlParam::Text(value));
                    clauses.push(format!("operativity = {ph}"));
                }
                EntityKey::Limit => {}
            }
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let statement = match template.shape {
            ResultShape::Records => {
                let limit = builder.bind(SqlParam::Int(effective_limit(entities)));
                format!(
                    "SELECT {RECORD_COLUMNS} FROM {TABLE}{where_sql} \
                     ORDER BY decision_date DESC LIMIT {limit}"
                )
            }
            ResultShape::CountScalar => {
                format!("SELECT COUNT(*) AS cnt FROM {TABLE}{where_sql}")
            }
            ResultShape::GroupedCount => {
                let group_expr = if template.id == "compare_by_year" {
                    "substr(decision_date, 1, 4)"
                } else {
                    "government_number"
                };
                format!(
                    "SELECT {group_expr} AS grp, COUNT(*) AS cnt FROM {TABLE}{where_sql} \
                     GROUP BY grp ORDER BY grp"
                )
            }
        };

        finish(statement, builder.params, template.id, template.shape)
    }

    /// No template matched: disjunctive text search over title, content,
    /// summary and tags, with the best-effort-normalized term.
    fn build_fallback(&self, intent: &Intent) -> Result<GeneratedQuery> {
        let term = self.fallback_term(intent)?;
        let mut builder = StatementBuilder::new();
        let ph = builder.bind(SqlParam::Text(term));
        let limit = builder.bind(SqlParam::Int(effective_limit(&intent.entities)));
        let statement = format!(
            "SELECT {RECORD_COLUMNS} FROM {TABLE} WHERE \
             (title LIKE '%' || {ph} || '%' OR content LIKE '%' || {ph} || '%' OR \
             summary LIKE '%' || {ph} || '%' OR tags_policy_area LIKE '%' || {ph} || '%') \
             ORDER BY decision_date DESC LIMIT {limit}"
        );
        Ok(finish(statement, builder.params, "fallback", ResultShape::Records))
    }

    fn fallback_term(&self, intent: &Intent) -> Result<String> {
        if let Some(topic) = intent.entities.topic.as_deref() {
            let term = self
                .normalizer
                .normalize(topic)
                .map(|tag| tag.into_string())
                .unwrap_or_else(|| topic.to_string());
            return Ok(term);
        }
        let trimmed = intent.original_text.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::NothingToSearch);
        }
        Ok(trimmed.to_string())
    }

    fn topic_predicate(&self, builder: &mut StatementBuilder, topic: &str) -> String {
        match self.normalizer.normalize(topic) {
            Some(tag) => {
                let ph = builder.bind(SqlParam::Text(tag.into_string()));
                format!("tags_policy_area LIKE '%' || {ph} || '%'")
            }
            // No canonical tag: this predicate alone widens to a text
            // search; the rest of the template is unaffected.
            None => {
                let ph = builder.bind(SqlParam::Text(topic.to_string()));
                format!(
                    "(title LIKE '%' || {ph} || '%' OR summary LIKE '%' || {ph} || '%' \
                     OR content LIKE '%' || {ph} || '%')"
                )
            }
        }
    }
}

fn effective_limit(entities: &EntitySet) -> i64 {
    i64::from(entities.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
}

fn finish(
    statement: String,
    params: Vec<SqlParam>,
    template_id: &str,
    shape: ResultShape,
) -> GeneratedQuery {
    let fingerprint = fingerprint_statement(&statement);
    GeneratedQuery {
        statement,
        params,
        template_id: template_id.to_string(),
        shape,
        fingerprint,
    }
}

/// The sole SQL-injection defense is parameter binding; re-check the finished
/// statement and reject it outright if any bound text leaked into the body.
pub fn verify_parameterized(query: &GeneratedQuery) -> Result<()> {
    for param in &query.params {
        let SqlParam::Text(value) = param else {
            continue;
        };
        if value.chars().count() >= 3 && query.statement.contains(value.as_str()) {
            return Err(GenerationError::UnboundUserText {
                template_id: query.template_id.clone(),
            });
        }
    }
    Ok(())
}
