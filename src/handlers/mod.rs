pub mod monitor;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::MonitorError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Monitor(MonitorError),
}

impl From<MonitorError> for AppError {
    fn from(err: MonitorError) -> Self {
        Self::Monitor(err)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Monitor(MonitorError::SchedulerAlreadyRunning) => StatusCode::CONFLICT,
            Self::Monitor(MonitorError::SourceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Monitor(MonitorError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Monitor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(msg) => msg,
            Self::Monitor(err) => err.to_string(),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_maps_to_conflict() {
        let err = AppError::from(MonitorError::SchedulerAlreadyRunning);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unavailable_source_maps_to_503() {
        let err = AppError::from(MonitorError::SourceUnavailable("down".into()));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
