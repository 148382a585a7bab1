use std::collections::HashMap;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use crate::delivery::{execute_delivery, plan_delivery};
use crate::error::{Result, SimError};
use crate::metrics;
use crate::mpd::{live_mpd, render_mpd};
use crate::server::state::AppState;
use crate::sim::parse_url_config;

/// Serve the whole live tree: manifests and segments under `/livesim/...`.
///
/// The `nowMS` query parameter freezes the wall clock for the request, which
/// makes every response reproducible; without it the real clock is read once
/// here and threaded through everything below.
pub async fn serve_live(
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> axum::response::Response {
    let start = Instant::now();
    let kind: &'static str = if path.ends_with(".mpd") {
        "manifest"
    } else {
        "segment"
    };

    let now_ms = match params.get("nowMS") {
        Some(v) => match v.parse::<u64>() {
            Ok(ms) => ms,
            Err(_) => {
                let e = SimError::InvalidConfiguration(format!("bad nowMS value '{v}'"));
                metrics::record_request(kind, e.status_code().as_u16());
                return e.into_response();
            }
        },
        None => Utc::now().timestamp_millis() as u64,
    };

    let result = handle_live(&state, &path, now_ms).await;
    match result {
        Ok(resp) => {
            metrics::record_request(kind, resp.status().as_u16());
            metrics::record_duration(kind, start);
            resp.into_response()
        }
        Err(e) => {
            metrics::record_request(kind, e.status_code().as_u16());
            metrics::record_duration(kind, start);
            e.into_response()
        }
    }
}

async fn handle_live(state: &AppState, path: &str, now_ms: u64) -> Result<Response<Body>> {
    let sim = parse_url_config(path, &state.config)?;
    let (asset, file_path) = state
        .registry
        .find_asset(&sim.content_path)
        .ok_or_else(|| SimError::NotFound(sim.content_path.clone()))?;

    info!(asset = %asset.asset_path, file = file_path, now_ms, "serving live request");

    if file_path.ends_with(".mpd") {
        let mpd = live_mpd(&asset, file_path, &sim, &state.config, now_ms)?;
        let xml = render_mpd(&mpd)?;
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/dash+xml")
            .body(Body::from(xml))
            .map_err(|e| SimError::Unexpected(e.to_string()));
    }

    let plan = plan_delivery(&asset, &sim, file_path, now_ms, state.boot_time.elapsed())?;
    execute_delivery(plan, state.storage.as_ref(), now_ms).await
}
