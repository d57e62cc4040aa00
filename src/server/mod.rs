//! HTTP surface (feature `server`).
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET  | `/` | liveness banner |
//! | GET  | `/health` | LLM availability |
//! | GET  | `/supported-formats` | extension labels |
//! | POST | `/convert` | multipart upload, full mode |
//! | POST | `/convert-url` | URL (JSON, form or multipart), full mode |
//! | POST | `/convert-fast` | multipart upload, fast mode |

pub mod error;
pub mod handlers;

use crate::config::ServiceConfig;
use crate::orchestrator::Orchestrator;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Multipart framing and form fields on top of the file itself.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// LLM facts reported by `/health` and `/supported-formats`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub llm_available: bool,
    pub llm_provider: String,
    pub llm_model: Option<String>,
}

impl ServiceInfo {
    pub fn new(config: &ServiceConfig, llm_available: bool) -> Self {
        Self {
            llm_available,
            llm_provider: config.llm_provider.clone(),
            llm_model: llm_available.then(|| config.llm_model.clone()),
        }
    }
}

/// Shared, read-only application state.
#[derive(Debug)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub info: ServiceInfo,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &ServiceConfig, llm_available: bool) -> Self {
        Self {
            orchestrator,
            info: ServiceInfo::new(config, llm_available),
            max_upload_bytes: config.max_upload_bytes,
            cors_origins: config.cors_origins.clone(),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/supported-formats", get(handlers::supported_formats))
        .route("/convert", post(handlers::convert))
        .route("/convert-url", post(handlers::convert_url))
        .route("/convert-fast", post(handlers::convert_fast))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.cors_origins))
        .with_state(state)
}

/// CORS for the configured origins; any origin when the list is empty.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
