//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for a thin wrapper around [`crate::Error`] so
//! route handlers can return `Result<T, ApiError>` and bubble failures with
//! `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// Wrapper carrying a service error into an HTTP response.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.0,
                "Server error in conversion handler"
            );
        }

        let code = match &self.0 {
            Error::InvalidInput(_) => "invalid_input",
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::EncoderUnavailable(_) => "encoder_unavailable",
            Error::Timeout(_) => "timeout",
            Error::ConversionFailed { .. } => "conversion_failed",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
