//! Stage invoker behavior against a real HTTP listener: classified retries,
//! breaker short-circuits, and orchestrator degradation with live stages.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use decision_pipeline::{
    BreakerConfig, BreakerRegistry, CircuitState, Orchestrator, PipelineConfig, RetryConfig,
    StageClient, StageEndpoint, StageEndpoints, StageError,
};
use decision_protocol::{
    ClarifyRequest, ClarifyResponse, DecisionRecord, IntentType, ResolveRequest, StageKind,
};
use decision_store::DecisionStore;

#[derive(Clone)]
struct FlakyState {
    hits: Arc<AtomicU32>,
    fail_first: u32,
}

async fn flaky_process(
    State(state): State<FlakyState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    if hit < state.fail_first {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(serde_json::json!({
        "question": "על איזה נושא לחפש?",
        "token_cost": 7
    })))
}

async fn spawn_flaky_stage(fail_first: u32) -> (SocketAddr, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/process", post(flaky_process))
        .route("/health", get(|| async { "ok" }))
        .with_state(FlakyState {
            hits: Arc::clone(&hits),
            fail_first,
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_delay: Duration::from_millis(50),
    }
}

fn client(max_attempts: u32, breaker: BreakerConfig) -> StageClient {
    StageClient::new(
        fast_retry(max_attempts),
        Duration::from_secs(2),
        Arc::new(BreakerRegistry::new(breaker)),
    )
}

fn clarify_request() -> ClarifyRequest {
    ClarifyRequest {
        intent: decision_protocol::Intent {
            intent_type: IntentType::Unclear,
            entities: Default::default(),
            confidence: 0.2,
            original_text: "שלום".to_string(),
        },
        reason: decision_protocol::RoutingReason::LowConfidence,
    }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let (addr, hits) = spawn_flaky_stage(2).await;
    let client = client(3, BreakerConfig::default());
    let endpoint = StageEndpoint::new(StageKind::Clarifier, format!("http://{addr}"));

    let response: ClarifyResponse = client.invoke(&endpoint, &clarify_request()).await.unwrap();
    assert_eq!(response.question, "על איזה נושא לחפש?");
    assert_eq!(response.token_cost, Some(7));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

async fn bad_request_process(State(hits): State<Arc<AtomicU32>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::BAD_REQUEST
}

#[tokio::test]
async fn client_errors_are_never_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/process", post(bad_request_process))
        .with_state(Arc::clone(&hits));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = client(3, BreakerConfig::default());
    let endpoint = StageEndpoint::new(StageKind::Ranker, format!("http://{addr}"));
    let err = client
        .invoke::<_, ClarifyResponse>(&endpoint, &clarify_request())
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Http { status: 400, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_circuit_short_circuits_without_network_attempts() {
    let (addr, hits) = spawn_flaky_stage(u32::MAX).await;
    let breaker = BreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_secs(60),
    };
    let client = client(1, breaker);
    let endpoint = StageEndpoint::new(StageKind::Evaluator, format!("http://{addr}"));

    for _ in 0..2 {
        let err = client
            .invoke::<_, ClarifyResponse>(&endpoint, &clarify_request())
            .await
            .unwrap_err();
        assert!(!matches!(err, StageError::CircuitOpen { .. }));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(client.breakers().state("evaluator"), CircuitState::Open);

    let err = client
        .invoke::<_, ClarifyResponse>(&endpoint, &clarify_request())
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::CircuitOpen { .. }));
    // No extra request reached the wire.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn one_probe_is_allowed_after_the_reset_timeout() {
    // Fails twice (opening the circuit), then recovers.
    let (addr, hits) = spawn_flaky_stage(2).await;
    let breaker = BreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_millis(100),
    };
    let client = client(1, breaker);
    let endpoint = StageEndpoint::new(StageKind::Formatter, format!("http://{addr}"));

    for _ in 0..2 {
        let _ = client
            .invoke::<_, ClarifyResponse>(&endpoint, &clarify_request())
            .await;
    }
    assert_eq!(client.breakers().state("formatter"), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // The probe goes through and closes the circuit.
    let response: ClarifyResponse = client.invoke(&endpoint, &clarify_request()).await.unwrap();
    assert!(!response.question.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(client.breakers().state("formatter"), CircuitState::Closed);
}

fn seeded_store() -> Arc<DecisionStore> {
    let store = Arc::new(DecisionStore::open_in_memory().unwrap());
    store
        .seed(&[DecisionRecord {
            id: 0,
            government_number: Some(37),
            decision_number: "100".to_string(),
            decision_date: "2024-02-01".to_string(),
            title: "תוכנית חומש לחינוך".to_string(),
            summary: Some("תקציר".to_string()),
            content: Some("תוכן".to_string()),
            operativity: Some("אופרטיבית".to_string()),
            tags_policy_area: Some("חינוך".to_string()),
            tags_government_body: None,
            prime_minister: None,
            decision_url: None,
        }])
        .unwrap();
    store
}

/// A dead endpoint: bound, then dropped, so connections are refused.
async fn dead_endpoint(kind: StageKind) -> StageEndpoint {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    StageEndpoint::new(kind, format!("http://{addr}"))
}

#[tokio::test]
async fn orchestrator_uses_formatter_and_degrades_only_failed_stages() {
    let formatter_app = Router::new().route(
        "/process",
        post(|| async {
            Json(serde_json::json!({
                "text": "נמצאה החלטה אחת בנושא חינוך.",
                "token_cost": 42
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let formatter_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, formatter_app).await.unwrap();
    });

    let endpoints = StageEndpoints {
        clarifier: None,
        evaluator: None,
        ranker: Some(dead_endpoint(StageKind::Ranker).await),
        formatter: Some(StageEndpoint::new(
            StageKind::Formatter,
            format!("http://{formatter_addr}"),
        )),
    };
    let config = PipelineConfig {
        retry: fast_retry(1),
        per_call_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(
        seeded_store(),
        endpoints,
        Arc::new(BreakerRegistry::new(BreakerConfig::default())),
        config,
    );

    let response = orchestrator
        .resolve(&ResolveRequest {
            text: "החלטות בנושא חינוך".to_string(),
            session_id: None,
            output: Default::default(),
        })
        .await;

    assert!(response.success);
    let answer = response.answer.unwrap();
    assert_eq!(answer.text, "נמצאה החלטה אחת בנושא חינוך.");
    assert_eq!(answer.results.len(), 1);

    let degraded = response.meta.degraded_path.unwrap();
    assert!(degraded.contains("unranked"));
    assert!(degraded.contains("unevaluated"));
    assert!(!degraded.contains("local_format"));
    assert_eq!(response.meta.token_cost, 42);
}
