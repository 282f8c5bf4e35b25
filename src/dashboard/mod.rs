//! Dashboard: read-only JSON query surface over axum.
//!
//! Serves the published snapshots, the credit budget and the EV history,
//! plus one write endpoint that queues a force refresh. CORS enabled for
//! local front-ends.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Bind the port and serve in a background task.
///
/// Binding happens before the spawn so a taken port fails startup.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<JoinHandle<()>> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/budget", get(routes::get_budget))
        .route("/api/sports", get(routes::get_sports))
        .route("/api/sports/:sport/games", get(routes::get_games))
        .route("/api/sports/:sport/props", get(routes::get_props))
        .route("/api/sports/:sport/ev", get(routes::get_ev))
        .route("/api/sports/:sport/arbs", get(routes::get_arbs))
        .route("/api/sports/:sport/middles", get(routes::get_middles))
        .route("/api/sports/:sport/refresh", post(routes::post_refresh))
        .route("/api/history", get(routes::get_history))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
