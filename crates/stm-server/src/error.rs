//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; any [`stm_core::Error`]
//! converts with `?` and renders as a JSON body with the status from
//! [`stm_core::Error::http_status`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError(pub stm_core::Error);

impl From<stm_core::Error> for AppError {
    fn from(e: stm_core::Error) -> Self {
        Self(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in handler");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Request rejected");
        }

        let body = match &self.0 {
            stm_core::Error::SessionNotFound(key) => json!({
                "error": "Session not found",
                "code": "session_not_found",
                "session": key,
            }),
            other => {
                let code = match other {
                    stm_core::Error::NotFound { .. } => "not_found",
                    stm_core::Error::SessionNotFound(_) => "session_not_found",
                    stm_core::Error::Validation(_) => "validation_error",
                    stm_core::Error::Io { .. } => "io_error",
                    stm_core::Error::Tool { .. } => "tool_error",
                    stm_core::Error::Probe(_) => "probe_error",
                    stm_core::Error::EncodeFailed { .. } => "encode_failed",
                    stm_core::Error::Internal(_) => "internal_error",
                };
                json!({ "error": other.to_string(), "code": code })
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
