use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::registry::LiveSnapshot;
use crate::AppState;

// ─── GET /api/metrics ────────────────────────────────────────────
/// Current window totals as JSON. Does not end the window.

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<LiveSnapshot> {
    Json(state.analyzer.live())
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a `LiveSnapshot` once per poll interval, so a dashboard sees each
/// tick's totals as they land.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(state.config.poll_interval());

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.analyzer.live();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
