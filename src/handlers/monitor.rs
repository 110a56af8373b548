use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::report::Report;
use crate::sampler::SamplerState;
use crate::AppState;

use super::AppError;

/// Longest accepted sampling interval (1 h).
const MAX_INTERVAL_MS: u64 = 3_600_000;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    /// Sampling interval; the configured `poll_interval_ms` when absent.
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    pub state: SamplerState,
    pub ticks: u64,
    pub message: String,
}

// ─── POST /api/monitor/start ─────────────────────────────────────

pub async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<MonitorStatus>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let interval_ms = req.interval_ms.unwrap_or(state.config.poll_interval_ms);

    if interval_ms == 0 || interval_ms > MAX_INTERVAL_MS {
        return Err(AppError::BadRequest(format!(
            "interval_ms must be between 1 and {MAX_INTERVAL_MS}"
        )));
    }

    state
        .analyzer
        .start_monitoring(Duration::from_millis(interval_ms))
        .await?;

    Ok(Json(MonitorStatus {
        state: SamplerState::Running,
        ticks: 0,
        message: format!("Sampling every {interval_ms}ms"),
    }))
}

// ─── POST /api/monitor/stop ──────────────────────────────────────

pub async fn stop_monitoring(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    let was_running = state.analyzer.state() == SamplerState::Running;
    state.analyzer.stop().await;

    Json(MonitorStatus {
        state: SamplerState::Stopped,
        ticks: state.analyzer.live().ticks,
        message: if was_running {
            "Sampler stopped".into()
        } else {
            "Sampler was not running".into()
        },
    })
}

// ─── GET /api/monitor/status ─────────────────────────────────────

pub async fn monitor_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    let live = state.analyzer.live();
    Json(MonitorStatus {
        state: state.analyzer.state(),
        ticks: live.ticks,
        message: format!("{} collectors tracked", live.collectors.len()),
    })
}

// ─── GET /api/report ─────────────────────────────────────────────

/// Ends the current window and returns its summary.
pub async fn get_report(State(state): State<Arc<AppState>>) -> Result<Json<Report>, AppError> {
    Ok(Json(state.analyzer.report().await?))
}
