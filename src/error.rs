//! Error types for the doctomd broker.
//!
//! Two layers of failure:
//!
//! * [`CapabilityError`]: what a conversion capability (the external
//!   collaborator behind [`crate::converter::DocumentConverter`]) reports.
//!   It carries a [`FailureKind`] tag so the retry executor can decide
//!   between "back off and try again" and "give up now" without re-reading
//!   error text.
//!
//! * [`DocToMdError`]: the request-level taxonomy returned by the
//!   orchestrator and mapped to HTTP status codes at the boundary.
//!
//! Upstream libraries (the LLM client, HTTP downloads) only expose opaque
//! error strings, so classification happens exactly once, where such a
//! string first becomes a [`CapabilityError`] ([`CapabilityError::classify`]).

use std::fmt;
use thiserror::Error;

/// How a capability failure should be treated by the retry executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upstream throttling (HTTP 429 or a rate-limit message). Retryable.
    RateLimited,
    /// The OCR / rasterisation / vision subsystem is missing or broken.
    /// Not retryable; surfaced with an actionable message.
    OcrUnavailable,
    /// Any other failure. Not retryable.
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::OcrUnavailable => "ocr_unavailable",
            FailureKind::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// A failure reported by one conversion capability.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CapabilityError {
    pub kind: FailureKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn ocr_unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::OcrUnavailable, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    /// Classify an opaque upstream error message.
    ///
    /// The LLM client does not expose a structured status code, so the
    /// message is the only signal: `"429"`, `"rate limit"` or
    /// `"rate_limited"` mean throttling, a mention of Tesseract means the
    /// OCR engine is unavailable, everything else is permanent.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if is_rate_limit_message(&message) {
            FailureKind::RateLimited
        } else if is_ocr_unavailable_message(&message) {
            FailureKind::OcrUnavailable
        } else {
            FailureKind::Permanent
        };
        Self { kind, message }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }
}

/// `true` when an upstream message signals throttling.
pub fn is_rate_limit_message(message: &str) -> bool {
    if message.contains("429") {
        return true;
    }
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("rate_limited") || lower.contains("rate-limit")
}

/// `true` when an upstream message points at a missing OCR engine.
pub fn is_ocr_unavailable_message(message: &str) -> bool {
    message.to_lowercase().contains("tesseract")
}

/// All request-level errors returned by the orchestrator.
#[derive(Debug, Error)]
pub enum DocToMdError {
    // ── Client errors ─────────────────────────────────────────────────────
    /// The extension (or source kind) is not registered for the mode,
    /// or is registered but has no converter behind it.
    #[error("{detail}")]
    UnsupportedFormat { extension: String, detail: String },

    /// The upload exceeds the configured size limit.
    #[error("File too large: {size} bytes exceeds the maximum of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The request is malformed (missing file, bad form field).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Upstream errors ───────────────────────────────────────────────────
    /// Upstream kept throttling until the attempt budget ran out.
    #[error("API rate limit exceeded after {attempts} attempt(s). Please try again later.")]
    RateLimited { attempts: u32 },

    /// The OCR / vision subsystem is not available.
    #[error("OCR service unavailable: {detail}")]
    OcrUnavailable { detail: String },

    /// A capability failed with a non-retryable error.
    #[error("{source}")]
    ConversionFailed {
        #[source]
        source: CapabilityError,
    },

    /// The retry loop ended without a result (only with a zero attempt budget).
    #[error("Failed to process request after {attempts} attempt(s)")]
    ExhaustedRetries { attempts: u32 },

    /// A raw capability failure that has not been through the retry
    /// executor yet. The executor turns it into one of the variants above.
    #[error("{0}")]
    Upstream(CapabilityError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Staging the upload on disk failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CapabilityError> for DocToMdError {
    fn from(e: CapabilityError) -> Self {
        DocToMdError::Upstream(e)
    }
}

impl DocToMdError {
    pub fn unsupported(extension: impl Into<String>, detail: impl Into<String>) -> Self {
        DocToMdError::UnsupportedFormat {
            extension: extension.into(),
            detail: detail.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DocToMdError::Io {
            context: context.into(),
            source,
        }
    }

    /// Resolve a raw [`DocToMdError::Upstream`] into its final category.
    ///
    /// Any other variant is already classified and is returned unchanged.
    /// A rate-limited upstream failure seen here (outside the executor)
    /// counts as a single attempt.
    pub fn classified(self) -> Self {
        match self {
            DocToMdError::Upstream(e) => match e.kind {
                FailureKind::RateLimited => DocToMdError::RateLimited { attempts: 1 },
                FailureKind::OcrUnavailable => DocToMdError::OcrUnavailable { detail: e.message },
                FailureKind::Permanent => DocToMdError::ConversionFailed { source: e },
            },
            other => other,
        }
    }

    /// HTTP status code for this error at the service boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            DocToMdError::UnsupportedFormat { .. } | DocToMdError::InvalidRequest(_) => 400,
            DocToMdError::PayloadTooLarge { .. } => 413,
            DocToMdError::RateLimited { .. } => 429,
            DocToMdError::Upstream(e) if e.is_rate_limited() => 429,
            _ => 500,
        }
    }

    /// Stable machine-readable category label.
    pub fn category(&self) -> &'static str {
        match self {
            DocToMdError::UnsupportedFormat { .. } => "unsupported_format",
            DocToMdError::PayloadTooLarge { .. } => "payload_too_large",
            DocToMdError::InvalidRequest(_) => "invalid_request",
            DocToMdError::RateLimited { .. } => "rate_limited",
            DocToMdError::OcrUnavailable { .. } => "ocr_unavailable",
            DocToMdError::ConversionFailed { .. } => "conversion_failed",
            DocToMdError::ExhaustedRetries { .. } => "exhausted_retries",
            DocToMdError::Upstream(e) => match e.kind {
                FailureKind::RateLimited => "rate_limited",
                FailureKind::OcrUnavailable => "ocr_unavailable",
                FailureKind::Permanent => "conversion_failed",
            },
            DocToMdError::Io { .. } => "io_error",
            DocToMdError::InvalidConfig(_) => "invalid_config",
            DocToMdError::Internal(_) => "internal",
        }
    }
}
