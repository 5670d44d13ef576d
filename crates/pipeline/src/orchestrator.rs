//! Sequences router → clarifier → query generation → execution →
//! evaluator/ranker → formatter, and owns the fallback cascade: an explicit
//! ordered list of strategies tried in sequence. The outer `resolve` always
//! returns a terminal response — degraded success beats a propagated error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use decision_intent::{IntentRouter, RouterConfig};
use decision_protocol::{
    Answer, ClarifyRequest, ClarifyResponse, DecisionRecord, EvaluateRequest, EvaluateResponse,
    FormatRequest, FormatResponse, GroupCount, Intent, QueryOutcome, RankRequest, RankResponse,
    ResolveMeta, ResolveRequest, ResolveResponse, RoutingReason, StageHealth, StageTiming,
};
use decision_sqlgen::QueryGenerator;
use decision_store::DecisionStore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::breaker::BreakerRegistry;
use crate::clarify;
use crate::error::{PipelineError, StageError};
use crate::invoker::{RetryConfig, StageClient, StageEndpoint};
use crate::render;

const GUIDANCE_MESSAGE: &str = "מצטערים, השירות אינו זמין כרגע. אפשר לנסות שוב בעוד מספר \
     דקות, או לנסח את השאלה אחרת — למשל: \"החלטות בנושא חינוך בשנת 2024\".";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retry: RetryConfig,
    pub per_call_timeout: Duration,
    /// Bounds each strategy attempt; on expiry the cascade advances.
    pub pipeline_timeout: Duration,
    pub threshold_low: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            per_call_timeout: Duration::from_secs(10),
            pipeline_timeout: Duration::from_secs(25),
            threshold_low: 0.7,
        }
    }
}

/// Downstream stage addresses. `None` means the stage is not deployed; the
/// pipeline degrades instead of failing.
#[derive(Debug, Clone, Default)]
pub struct StageEndpoints {
    pub clarifier: Option<StageEndpoint>,
    pub evaluator: Option<StageEndpoint>,
    pub ranker: Option<StageEndpoint>,
    pub formatter: Option<StageEndpoint>,
}

impl StageEndpoints {
    #[must_use]
    pub fn configured(&self) -> Vec<&StageEndpoint> {
        [&self.clarifier, &self.evaluator, &self.ranker, &self.formatter]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// What one strategy produced; feeds the response metadata.
struct Resolution {
    answer: Answer,
    timings: Vec<StageTiming>,
    query_id: Option<String>,
    degraded: Vec<&'static str>,
}

struct RequestContext<'a> {
    request: &'a ResolveRequest,
    intent: &'a Intent,
}

#[async_trait]
trait QueryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, ctx: &RequestContext<'_>) -> Result<Resolution, PipelineError>;
}

struct PipelineShared {
    generator: QueryGenerator,
    store: Arc<DecisionStore>,
    stages: StageClient,
    endpoints: StageEndpoints,
    config: PipelineConfig,
}

impl PipelineShared {
    async fn call<Req, Resp>(
        &self,
        endpoint: &StageEndpoint,
        request: &Req,
    ) -> (Result<Resp, StageError>, u64)
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let started = Instant::now();
        let result = self.stages.invoke(endpoint, request).await;
        (result, started.elapsed().as_millis() as u64)
    }
}

pub struct Orchestrator {
    router: IntentRouter,
    breakers: Arc<BreakerRegistry>,
    shared: Arc<PipelineShared>,
    strategies: Vec<Arc<dyn QueryStrategy>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<DecisionStore>,
        endpoints: StageEndpoints,
        breakers: Arc<BreakerRegistry>,
        config: PipelineConfig,
    ) -> Self {
        let router = IntentRouter::new(RouterConfig {
            threshold_low: config.threshold_low,
        });
        let stages = StageClient::new(
            config.retry.clone(),
            config.per_call_timeout,
            Arc::clone(&breakers),
        );
        let shared = Arc::new(PipelineShared {
            generator: QueryGenerator::with_builtin_taxonomy(),
            store,
            stages,
            endpoints,
            config,
        });
        let strategies: Vec<Arc<dyn QueryStrategy>> = vec![
            Arc::new(TemplateStrategy {
                shared: Arc::clone(&shared),
            }),
            Arc::new(LegacyStrategy {
                shared: Arc::clone(&shared),
            }),
            Arc::new(GuidanceStrategy),
        ];
        Self {
            router,
            breakers,
            shared,
            strategies,
        }
    }

    /// The cascade order, for tests and diagnostics.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Resolve one request. Always returns a terminal response: a real
    /// answer, a clarification question, degraded results, or guidance.
    pub async fn resolve(&self, request: &ResolveRequest) -> ResolveResponse {
        let started = Instant::now();
        let intent = self.router.classify(&request.text);
        let router_timing = timing("router", true, started.elapsed().as_millis() as u64, None);
        let ctx = RequestContext {
            request,
            intent: &intent,
        };

        for strategy in &self.strategies {
            let attempt =
                tokio::time::timeout(self.shared.config.pipeline_timeout, strategy.attempt(&ctx))
                    .await;
            match attempt {
                Ok(Ok(resolution)) => {
                    return build_response(&intent, router_timing, resolution, started);
                }
                Ok(Err(err)) => {
                    log::warn!("strategy '{}' failed, falling back: {err}", strategy.name());
                }
                Err(_) => {
                    log::warn!("strategy '{}' exceeded the pipeline timeout", strategy.name());
                }
            }
        }

        // The cascade ends in an infallible strategy; this only runs if the
        // guidance strategy itself timed out.
        build_response(&intent, router_timing, guidance_resolution(), started)
    }

    /// Per-stage liveness plus the current breaker state.
    pub async fn stage_health(&self) -> Vec<StageHealth> {
        let mut out = Vec::new();
        for endpoint in self.shared.endpoints.configured() {
            let reachable = self.shared.stages.health(endpoint).await;
            out.push(StageHealth {
                stage: endpoint.kind,
                reachable,
                breaker: self.breakers.state(endpoint.kind.as_str()).as_str().to_string(),
            });
        }
        out
    }
}

fn build_response(
    intent: &Intent,
    router_timing: StageTiming,
    resolution: Resolution,
    started: Instant,
) -> ResolveResponse {
    let mut stage_timings = vec![router_timing];
    stage_timings.extend(resolution.timings);
    let token_cost = stage_timings.iter().filter_map(|t| t.token_cost).sum();
    let degraded_path = if resolution.degraded.is_empty() {
        None
    } else {
        Some(resolution.degraded.join(","))
    };

    ResolveResponse {
        success: true,
        answer: Some(resolution.answer),
        error: None,
        meta: ResolveMeta {
            intent_type: intent.intent_type,
            confidence: intent.confidence,
            entities: intent.entities.clone(),
            query_id: resolution.query_id,
            stage_timings,
            total_ms: started.elapsed().as_millis() as u64,
            token_cost,
            degraded_path,
        },
    }
}

fn timing(stage: &str, success: bool, latency_ms: u64, token_cost: Option<u64>) -> StageTiming {
    StageTiming {
        stage: stage.to_string(),
        success,
        latency_ms,
        token_cost,
    }
}

fn guidance_resolution() -> Resolution {
    Resolution {
        answer: Answer {
            text: GUIDANCE_MESSAGE.to_string(),
            results: Vec::new(),
            count: None,
            clarification: false,
        },
        timings: Vec::new(),
        query_id: None,
        degraded: vec!["guidance"],
    }
}

/// Reorder rows by a ranker permutation. Out-of-range indices are ignored;
/// rows the permutation misses keep their original relative order.
fn apply_order(rows: Vec<DecisionRecord>, order: &[usize]) -> Vec<DecisionRecord> {
    let mut slots: Vec<Option<DecisionRecord>> = rows.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    for &idx in order {
        if let Some(slot) = slots.get_mut(idx) {
            if let Some(record) = slot.take() {
                out.push(record);
            }
        }
    }
    for slot in slots {
        if let Some(record) = slot {
            out.push(record);
        }
    }
    out
}

/// Primary path: gate, template SQL, execution, then the downstream stages
/// with per-stage degradation.
struct TemplateStrategy {
    shared: Arc<PipelineShared>,
}

#[async_trait]
impl QueryStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn attempt(&self, ctx: &RequestContext<'_>) -> Result<Resolution, PipelineError> {
        let intent = ctx.intent;
        let decision = decision_intent::route(intent, self.shared.config.threshold_low);
        if !decision.proceed {
            return Ok(self.clarify(ctx, decision.reason).await);
        }

        let mut timings = Vec::new();
        let mut degraded: Vec<&'static str> = Vec::new();

        let gen_started = Instant::now();
        let query = self.shared.generator.build(intent)?;
        timings.push(timing(
            "sqlgen",
            true,
            gen_started.elapsed().as_millis() as u64,
            None,
        ));
        let query_id = query.fingerprint.clone();

        let exec_started = Instant::now();
        let store = Arc::clone(&self.shared.store);
        let exec_query = query.clone();
        let outcome = tokio::task::spawn_blocking(move || store.execute(&exec_query))
            .await
            .map_err(|err| PipelineError::Internal(format!("execution task failed: {err}")))??;
        timings.push(timing(
            "execution",
            true,
            exec_started.elapsed().as_millis() as u64,
            None,
        ));
        log::info!(
            "executed query {query_id} (template {}): {} result(s)",
            query.template_id,
            outcome.row_count()
        );

        let mut rows: Vec<DecisionRecord> = Vec::new();
        let mut count: Option<i64> = None;
        let mut groups: Vec<GroupCount> = Vec::new();
        match outcome {
            QueryOutcome::Rows(r) => {
                rows = r;
                if let Some(max) = ctx.request.output.max_results {
                    rows.truncate(max as usize);
                }
            }
            QueryOutcome::CountValue(n) => count = Some(n),
            QueryOutcome::GroupedCounts(g) => groups = g,
        }

        // Ranking and evaluation depend only on the result set, not on each
        // other, so they run concurrently. Either may fail without taking
        // the request down.
        let mut evaluation = None;
        if !rows.is_empty() {
            let (eval, rank) = tokio::join!(self.evaluate(intent, &rows), self.rank(intent, &rows));

            match eval {
                Some((Ok(resp), latency)) => {
                    timings.push(timing("evaluator", true, latency, resp.token_cost));
                    evaluation = Some(resp.relevance);
                }
                Some((Err(err), latency)) => {
                    log::warn!("evaluator unavailable, returning unevaluated results: {err}");
                    timings.push(timing("evaluator", false, latency, None));
                    degraded.push("unevaluated");
                }
                None => degraded.push("unevaluated"),
            }

            match rank {
                Some((Ok(resp), latency)) => {
                    timings.push(timing("ranker", true, latency, resp.token_cost));
                    rows = apply_order(rows, &resp.order);
                }
                Some((Err(err), latency)) => {
                    log::warn!("ranker unavailable, returning unranked results: {err}");
                    timings.push(timing("ranker", false, latency, None));
                    degraded.push("unranked");
                }
                None => degraded.push("unranked"),
            }
        }

        let format_request = FormatRequest {
            results: rows.clone(),
            count,
            groups: groups.clone(),
            intent: intent.clone(),
            evaluation,
        };
        let text = match self.shared.endpoints.formatter.as_ref() {
            Some(endpoint) => {
                let (result, latency) = self
                    .shared
                    .call::<_, FormatResponse>(endpoint, &format_request)
                    .await;
                match result {
                    Ok(resp) => {
                        timings.push(timing("formatter", true, latency, resp.token_cost));
                        resp.text
                    }
                    Err(err) => {
                        log::warn!("formatter unavailable, rendering locally: {err}");
                        timings.push(timing("formatter", false, latency, None));
                        degraded.push("local_format");
                        local_render(&rows, count, &groups, ctx.request.output.brief)
                    }
                }
            }
            None => {
                degraded.push("local_format");
                local_render(&rows, count, &groups, ctx.request.output.brief)
            }
        };

        Ok(Resolution {
            answer: Answer {
                text,
                results: rows,
                count,
                clarification: false,
            },
            timings,
            query_id: Some(query_id),
            degraded,
        })
    }
}

impl TemplateStrategy {
    async fn clarify(&self, ctx: &RequestContext<'_>, reason: RoutingReason) -> Resolution {
        let intent = ctx.intent;
        let mut timings = Vec::new();
        let mut degraded = Vec::new();

        let question = match self.shared.endpoints.clarifier.as_ref() {
            Some(endpoint) => {
                let request = ClarifyRequest {
                    intent: intent.clone(),
                    reason,
                };
                let (result, latency) = self
                    .shared
                    .call::<_, ClarifyResponse>(endpoint, &request)
                    .await;
                match result {
                    Ok(resp) => {
                        timings.push(timing("clarifier", true, latency, resp.token_cost));
                        resp.question
                    }
                    Err(err) => {
                        log::warn!("clarifier unavailable, using local question: {err}");
                        timings.push(timing("clarifier", false, latency, None));
                        degraded.push("local_clarifier");
                        clarify::local_question(intent, reason)
                    }
                }
            }
            None => {
                degraded.push("local_clarifier");
                clarify::local_question(intent, reason)
            }
        };

        Resolution {
            answer: Answer {
                text: question,
                results: Vec::new(),
                count: None,
                clarification: true,
            },
            timings,
            query_id: None,
            degraded,
        }
    }

    async fn evaluate(
        &self,
        intent: &Intent,
        rows: &[DecisionRecord],
    ) -> Option<(Result<EvaluateResponse, StageError>, u64)> {
        let endpoint = self.shared.endpoints.evaluator.as_ref()?;
        let request = EvaluateRequest {
            results: rows.to_vec(),
            intent: intent.clone(),
        };
        Some(self.shared.call(endpoint, &request).await)
    }

    async fn rank(
        &self,
        intent: &Intent,
        rows: &[DecisionRecord],
    ) -> Option<(Result<RankResponse, StageError>, u64)> {
        let endpoint = self.shared.endpoints.ranker.as_ref()?;
        let request = RankRequest {
            results: rows.to_vec(),
            intent: intent.clone(),
        };
        Some(self.shared.call(endpoint, &request).await)
    }
}

fn local_render(
    rows: &[DecisionRecord],
    count: Option<i64>,
    groups: &[GroupCount],
    brief: bool,
) -> String {
    if let Some(n) = count {
        render::render_count(n)
    } else if !groups.is_empty() {
        render::render_groups(groups)
    } else {
        render::render_rows(rows, brief)
    }
}

/// Single-pass engine: one disjunctive text search against the store,
/// bypassing templates and downstream stages entirely.
struct LegacyStrategy {
    shared: Arc<PipelineShared>,
}

#[async_trait]
impl QueryStrategy for LegacyStrategy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn attempt(&self, ctx: &RequestContext<'_>) -> Result<Resolution, PipelineError> {
        let intent = ctx.intent;
        let term = intent
            .entities
            .topic
            .clone()
            .unwrap_or_else(|| ctx.request.text.trim().to_string());
        if term.is_empty() {
            return Err(decision_sqlgen::GenerationError::NothingToSearch.into());
        }

        let limit = intent.entities.limit.unwrap_or(10).min(50);
        let started = Instant::now();
        let store = Arc::clone(&self.shared.store);
        let search_term = term.clone();
        let rows = tokio::task::spawn_blocking(move || store.legacy_search(&search_term, limit))
            .await
            .map_err(|err| PipelineError::Internal(format!("legacy task failed: {err}")))??;

        log::info!("legacy engine answered '{term}' with {} result(s)", rows.len());
        let text = render::render_rows(&rows, ctx.request.output.brief);
        Ok(Resolution {
            answer: Answer {
                text,
                results: rows,
                count: None,
                clarification: false,
            },
            timings: vec![timing(
                "legacy",
                true,
                started.elapsed().as_millis() as u64,
                None,
            )],
            query_id: None,
            degraded: vec!["legacy"],
        })
    }
}

/// Terminal strategy: a fixed, localized guidance message. Cannot fail.
struct GuidanceStrategy;

#[async_trait]
impl QueryStrategy for GuidanceStrategy {
    fn name(&self) -> &'static str {
        "guidance"
    }

    async fn attempt(&self, _ctx: &RequestContext<'_>) -> Result<Resolution, PipelineError> {
        Ok(guidance_resolution())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use pretty_assertions::assert_eq;

    fn record(number: &str, date: &str, title: &str, tags: &str) -> DecisionRecord {
        DecisionRecord {
            id: 0,
            government_number: Some(37),
            decision_number: number.to_string(),
            decision_date: date.to_string(),
            title: title.to_string(),
            summary: Some(format!("תקציר {title}")),
            content: Some(format!("תוכן {title}")),
            operativity: Some("אופרטיבית".to_string()),
            tags_policy_area: Some(tags.to_string()),
            tags_government_body: None,
            prime_minister: None,
            decision_url: None,
        }
    }

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(DecisionStore::open_in_memory().unwrap());
        store
            .seed(&[
                record("100", "2024-02-01", "תוכנית חומש לחינוך", "חינוך"),
                record("101", "2024-04-10", "תקציב מערכת הבריאות", "בריאות"),
                record("102", "2023-11-05", "רפורמת היסעים", "חינוך"),
            ])
            .unwrap();
        Orchestrator::new(
            store,
            StageEndpoints::default(),
            Arc::new(BreakerRegistry::new(BreakerConfig::default())),
            PipelineConfig::default(),
        )
    }

    fn request(text: &str) -> ResolveRequest {
        ResolveRequest {
            text: text.to_string(),
            session_id: None,
            output: Default::default(),
        }
    }

    #[test]
    fn cascade_order_is_template_then_legacy_then_guidance() {
        let names = orchestrator().strategy_names();
        assert_eq!(names, vec!["template", "legacy", "guidance"]);
    }

    #[tokio::test]
    async fn count_question_returns_a_count() {
        let response = orchestrator()
            .resolve(&request("כמה החלטות קיבלה ממשלה 37"))
            .await;
        assert!(response.success);
        let answer = response.answer.unwrap();
        assert_eq!(answer.count, Some(3));
        assert!(answer.text.starts_with("📊"));
        assert!(response.meta.query_id.is_some());
        // No formatter is configured, so the local rendering is reported.
        assert!(response.meta.degraded_path.unwrap().contains("local_format"));
    }

    #[tokio::test]
    async fn topic_search_returns_matching_rows() {
        let response = orchestrator()
            .resolve(&request("החלטות בנושא חינוך"))
            .await;
        let answer = response.answer.unwrap();
        assert_eq!(answer.results.len(), 2);
        // newest first
        assert_eq!(answer.results[0].decision_number, "100");
        assert!(!answer.clarification);
    }

    #[tokio::test]
    async fn unclear_text_asks_a_clarifying_question() {
        let response = orchestrator().resolve(&request("שלום")).await;
        let answer = response.answer.unwrap();
        assert!(answer.clarification);
        assert!(!answer.text.is_empty());
        assert!(response.meta.query_id.is_none());
    }

    #[tokio::test]
    async fn ambiguous_time_asks_for_a_range() {
        let response = orchestrator()
            .resolve(&request("אילו החלטות התקבלו לאחרונה בנושא בריאות"))
            .await;
        let answer = response.answer.unwrap();
        assert!(answer.clarification);
        assert!(answer.text.contains("לאחרונה"));
    }

    #[tokio::test]
    async fn metadata_reports_the_pipeline_trace() {
        let response = orchestrator()
            .resolve(&request("החלטות בנושא בריאות"))
            .await;
        let stages: Vec<&str> = response
            .meta
            .stage_timings
            .iter()
            .map(|t| t.stage.as_str())
            .collect();
        assert!(stages.contains(&"router"));
        assert!(stages.contains(&"sqlgen"));
        assert!(stages.contains(&"execution"));
    }

    #[test]
    fn rank_order_application_is_lossless() {
        let rows = vec![
            record("1", "2024-01-01", "א", "חינוך"),
            record("2", "2024-01-02", "ב", "חינוך"),
            record("3", "2024-01-03", "ג", "חינוך"),
        ];
        // Out-of-range index and a missing one.
        let ordered = apply_order(rows, &[2, 9, 0]);
        let numbers: Vec<&str> = ordered.iter().map(|r| r.decision_number.as_str()).collect();
        assert_eq!(numbers, vec!["3", "1", "2"]);
    }
}
