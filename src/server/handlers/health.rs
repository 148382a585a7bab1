use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::server::state::AppState;

/// Liveness probe with a few operational facts.
pub async fn health_check(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "assets": state.registry.len(),
        "uptime_s": state.boot_time.elapsed().as_secs(),
    }))
    .into_response()
}

/// Prometheus exposition endpoint.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder owned by another instance",
        )
            .into_response(),
    }
}
