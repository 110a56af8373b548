use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Sampler lifecycle ───────────────────────────────────
        .route(
            "/api/monitor/start",
            post(handlers::monitor::start_monitoring),
        )
        .route(
            "/api/monitor/stop",
            post(handlers::monitor::stop_monitoring),
        )
        .route(
            "/api/monitor/status",
            get(handlers::monitor::monitor_status),
        )
        // ── Window summary ──────────────────────────────────────
        .route("/api/report", get(handlers::monitor::get_report))
        // ── Live totals ─────────────────────────────────────────
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
