//! Request orchestration: dispatch, staging, retry, normalisation.
//!
//! Every request walks the same states:
//!
//! ```text
//! Received ─▶ TypeValidated ─▶ Staged ─▶ Converting ─▶ Normalized ─▶ Released(ok)
//!     │             │             │           │
//!     └─────────────┴─────────────┴───────────┴──────────────────────▶ Released(err)
//! ```
//!
//! Type validation happens before anything touches the disk, and the staged
//! file is released on every path out of [`Orchestrator::convert_upload`],
//! including a dropped (cancelled) request future.

use crate::config::{ConversionOptions, ServiceConfig};
use crate::converter::{self, DocumentConverter, Source, VisionConverter};
use crate::error::DocToMdError;
use crate::format::{self, ConversionMode, SourceKind};
use crate::output::{self, ConversionResponse};
use crate::retry::RetryPolicy;
use crate::staging;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where a request's document comes from.
#[derive(Debug, Clone)]
pub enum RequestSource {
    Upload { bytes: Vec<u8>, declared_name: String },
    Url { url: String },
}

/// One conversion request, owned by the orchestrator while it runs.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: RequestSource,
    pub mode: ConversionMode,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn upload(
        bytes: impl Into<Vec<u8>>,
        declared_name: impl Into<String>,
        mode: ConversionMode,
        options: ConversionOptions,
    ) -> Self {
        Self {
            source: RequestSource::Upload {
                bytes: bytes.into(),
                declared_name: declared_name.into(),
            },
            mode,
            options,
        }
    }

    pub fn url(url: impl Into<String>, options: ConversionOptions) -> Self {
        Self {
            source: RequestSource::Url { url: url.into() },
            mode: ConversionMode::Full,
            options,
        }
    }
}

/// Lifecycle position of a request, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Received,
    TypeValidated,
    Staged,
    Converting,
    Normalized,
    Released,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Received => "received",
            RequestState::TypeValidated => "type_validated",
            RequestState::Staged => "staged",
            RequestState::Converting => "converting",
            RequestState::Normalized => "normalized",
            RequestState::Released => "released",
        };
        f.write_str(s)
    }
}

/// Composes dispatch, staging, retry and normalisation for both modes.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every request.
pub struct Orchestrator {
    full: Arc<dyn DocumentConverter>,
    fast: Arc<dyn DocumentConverter>,
    retry: RetryPolicy,
    staging_dir: Option<PathBuf>,
    max_upload_bytes: usize,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retry", &self.retry)
            .field("staging_dir", &self.staging_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// `full` serves `/convert` and `/convert-url`; `fast` serves
    /// `/convert-fast` and must not call an LLM.
    pub fn new(
        full: Arc<dyn DocumentConverter>,
        fast: Arc<dyn DocumentConverter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            full,
            fast,
            retry,
            staging_dir: None,
            max_upload_bytes: ServiceConfig::default().max_upload_bytes,
        }
    }

    /// Orchestrator over the default [`VisionConverter`].
    pub fn from_config(
        config: &ServiceConfig,
        provider: Option<Arc<dyn LLMProvider>>,
    ) -> Result<Self, DocToMdError> {
        let full = VisionConverter::new(config, provider)?;
        let fast = VisionConverter::without_llm(config)?;
        let retry = RetryPolicy::new(config.max_attempts, config.retry_base_delay());

        let mut orchestrator = Self::new(Arc::new(full), Arc::new(fast), retry)
            .with_max_upload_bytes(config.max_upload_bytes);
        if let Some(ref dir) = config.staging_dir {
            orchestrator = orchestrator.with_staging_dir(dir.clone());
        }
        Ok(orchestrator)
    }

    /// Stage uploads in `dir` instead of the OS temp dir.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Run any request.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionResponse, DocToMdError> {
        match request.source {
            RequestSource::Upload {
                bytes,
                declared_name,
            } => {
                self.convert_upload(&bytes, &declared_name, request.mode, request.options)
                    .await
            }
            RequestSource::Url { url } => {
                format::resolve(request.mode, SourceKind::Url)?;
                self.convert_url(&url, request.options).await
            }
        }
    }

    /// Convert an uploaded file.
    pub async fn convert_upload(
        &self,
        bytes: &[u8],
        declared_name: &str,
        mode: ConversionMode,
        options: ConversionOptions,
    ) -> Result<ConversionResponse, DocToMdError> {
        let request_id = Uuid::new_v4();
        let extension = format::extension_of(declared_name);
        let span = info_span!("convert", %request_id, %mode, file_type = %extension);

        self.run_upload(bytes, declared_name, &extension, mode, options)
            .instrument(span)
            .await
    }

    async fn run_upload(
        &self,
        bytes: &[u8],
        declared_name: &str,
        extension: &str,
        mode: ConversionMode,
        options: ConversionOptions,
    ) -> Result<ConversionResponse, DocToMdError> {
        debug!(state = %RequestState::Received, "{} ({} bytes)", declared_name, bytes.len());

        let capability = format::resolve(mode, SourceKind::File(extension)).inspect_err(|e| {
            info!(state = %RequestState::Released, "Rejected {}: {}", declared_name, e);
        })?;
        if bytes.len() > self.max_upload_bytes {
            info!(state = %RequestState::Released, "Rejected {}: too large", declared_name);
            return Err(DocToMdError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }
        debug!(state = %RequestState::TypeValidated, capability = capability.tag());

        let options = match mode {
            ConversionMode::Full => options,
            ConversionMode::Fast => ConversionOptions {
                output_type: options.output_type,
                ..ConversionOptions::fast()
            },
        };
        let backend = self.backend(mode);

        let mut staged = staging::stage(bytes, extension, self.staging_dir.as_deref()).await?;
        debug!(state = %RequestState::Staged, path = %staged.path().display());

        let result = {
            let path = staged.path();
            let options = &options;
            debug!(state = %RequestState::Converting);
            self.retry
                .execute(|| converter::invoke(backend, capability, Source::File(path), options))
                .await
        };

        staged.release();
        debug!(state = %RequestState::Released);

        match result {
            Ok(pages) => {
                let message = match mode {
                    ConversionMode::Full => format!("Chuyển đổi thành công {declared_name}"),
                    ConversionMode::Fast => format!("Chuyển đổi nhanh thành công {declared_name}"),
                };
                let response = output::normalize(pages, extension, message);
                info!(
                    state = %RequestState::Normalized,
                    "Converted {}: {} pages",
                    declared_name,
                    response.total_pages
                );
                Ok(response)
            }
            Err(e) => {
                warn!(category = e.category(), "Conversion of {} failed: {}", declared_name, e);
                Err(e)
            }
        }
    }

    /// Convert the document at `url` (full mode only).
    pub async fn convert_url(
        &self,
        url: &str,
        options: ConversionOptions,
    ) -> Result<ConversionResponse, DocToMdError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("convert_url", %request_id, mode = "full", file_type = "url");

        async {
            debug!(state = %RequestState::Received, "{}", url);
            let url = url.trim();
            if url.is_empty() {
                return Err(DocToMdError::InvalidRequest("url must not be empty".into()));
            }
            let capability = format::resolve(ConversionMode::Full, SourceKind::Url)?;
            debug!(state = %RequestState::TypeValidated, capability = capability.tag());

            let backend = self.backend(ConversionMode::Full);
            let options = &options;
            debug!(state = %RequestState::Converting);
            let result = self
                .retry
                .execute(|| converter::invoke(backend, capability, Source::Url(url), options))
                .await;
            debug!(state = %RequestState::Released);

            match result {
                Ok(pages) => {
                    let response = output::normalize(
                        pages,
                        capability.tag(),
                        format!("Chuyển đổi URL thành công: {url}"),
                    );
                    info!(
                        state = %RequestState::Normalized,
                        "Converted {}: {} pages",
                        url,
                        response.total_pages
                    );
                    Ok(response)
                }
                Err(e) => {
                    warn!(category = e.category(), "Conversion of {} failed: {}", url, e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn backend(&self, mode: ConversionMode) -> &dyn DocumentConverter {
        match mode {
            ConversionMode::Full => self.full.as_ref(),
            ConversionMode::Fast => self.fast.as_ref(),
        }
    }
}
