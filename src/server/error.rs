//! HTTP error responses.
//!
//! Every failing handler returns an [`ApiError`], rendered as
//!
//! ```json
//! { "success": false, "message": "...", "error": "rate_limited", "detail": "..." }
//! ```
//!
//! `detail` repeats `message` for the web frontend, which reads that key.
//! Internal failures (I/O, configuration) are logged in full
//! and only a generic message is returned, so file paths never reach clients.

use crate::error::DocToMdError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

/// Which endpoint failed; selects the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Convert,
    ConvertUrl,
    ConvertFast,
}

impl Endpoint {
    fn prefix(self) -> &'static str {
        match self {
            Endpoint::Convert => "Lỗi khi chuyển đổi",
            Endpoint::ConvertUrl => "Lỗi khi chuyển đổi URL",
            Endpoint::ConvertFast => "Lỗi khi chuyển đổi nhanh",
        }
    }
}

pub const OCR_UNAVAILABLE_MESSAGE: &str =
    "OCR service không khả dụng. Vui lòng cài đặt Tesseract OCR hoặc thử với file khác.";

pub const RATE_LIMITED_MESSAGE: &str = "API rate limit exceeded. Vui lòng thử lại sau.";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub category: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            category,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    /// Map an orchestrator error raised by `endpoint`.
    pub fn conversion(endpoint: Endpoint, err: DocToMdError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let category = err.category();

        let message = match err.classified() {
            DocToMdError::UnsupportedFormat { detail, .. } => detail,
            e @ (DocToMdError::InvalidRequest(_) | DocToMdError::PayloadTooLarge { .. }) => {
                e.to_string()
            }
            DocToMdError::RateLimited { attempts } => {
                warn!(attempts, "rate limit exhausted");
                RATE_LIMITED_MESSAGE.to_string()
            }
            DocToMdError::OcrUnavailable { detail } => {
                warn!(detail = %detail, "OCR subsystem unavailable");
                OCR_UNAVAILABLE_MESSAGE.to_string()
            }
            e @ (DocToMdError::ConversionFailed { .. } | DocToMdError::ExhaustedRetries { .. }) => {
                format!("{}: {}", endpoint.prefix(), e)
            }
            e => {
                error!(error = %e, "internal error during conversion");
                format!("{}: internal server error", endpoint.prefix())
            }
        };

        Self::new(status, category, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
            "error": self.category,
            "detail": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
