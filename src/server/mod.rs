pub mod handlers;
pub mod state;

use axum::http::{header::HeaderName, HeaderValue};
use axum::{routing::get, Router};
use state::AppState;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

use crate::config::Config;

/// Build the full application router.
///
/// Separate from `start` so tests can drive it with `tower::ServiceExt`
/// without binding a socket.
pub fn build_router(config: Config) -> Result<Router, Box<dyn std::error::Error>> {
    let state = AppState::new(config)?;

    let app = Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/livesim/{*path}", get(handlers::live::serve_live))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-dashsim-version"),
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        ))
        .with_state(state);

    Ok(app)
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);
    let app = build_router(config)?;

    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("Live origin listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
