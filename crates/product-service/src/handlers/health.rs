use crate::app::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Liveness.
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

pub async fn root() -> &'static str {
    "Hello, World!"
}

/// Readiness follows the dependency's circuit: 503 while it is open.
pub async fn ready(State(state): State<AppState>) -> Response {
    let breaker = state.dependency.breaker();
    let status =
        StatusCode::from_u16(breaker.http_status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let snapshot = breaker.snapshot();

    (
        status,
        Json(json!({
            "status": breaker.health_status(),
            "dependency": snapshot.name,
            "circuit_state": snapshot.state,
            "counts": snapshot.counts,
            "time_in_state_ms": snapshot.time_in_state.as_millis() as u64,
        })),
    )
        .into_response()
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
