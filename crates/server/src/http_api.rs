//! The inbound HTTP surface: `POST /resolve` and `GET /health`.
//!
//! Pipeline degradation never surfaces as a 5xx — the orchestrator always
//! resolves. Only malformed requests earn an error envelope.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use decision_pipeline::Orchestrator;
use decision_protocol::{
    ErrorEnvelope, ResolveRequest, ResolveResponse, StageHealth, PROTOCOL_SCHEMA_VERSION,
};
use decision_store::DecisionStore;
use serde::Serialize;

use crate::metrics::MetricsExporter;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<DecisionStore>,
    pub metrics: Option<MetricsExporter>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/resolve", post(resolve))
        .route("/health", get(health))
        .with_state(state)
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, (StatusCode, Json<ErrorEnvelope>)> {
    if request.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(
                ErrorEnvelope::new("invalid_request", "text must not be empty").with_hint(
                    "Send a Hebrew question, e.g. {\"text\": \"החלטות בנושא חינוך בשנת 2024\"}",
                ),
            ),
        ));
    }

    let response = state.orchestrator.resolve(&request).await;
    if let Some(metrics) = &state.metrics {
        metrics.observe(&response);
    }
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    schema_version: u32,
    store_reachable: bool,
    decisions: i64,
    stages: Vec<StageHealth>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let decisions = state.store.count_all().unwrap_or(-1);
    let store_reachable = decisions >= 0;
    let stages = state.orchestrator.stage_health().await;

    // An unreachable stage degrades answers but the cascade still resolves,
    // so the service itself stays up.
    let status = if store_reachable { "ok" } else { "degraded" };
    Json(HealthResponse {
        status,
        schema_version: PROTOCOL_SCHEMA_VERSION,
        store_reachable,
        decisions: decisions.max(0),
        stages,
    })
}
