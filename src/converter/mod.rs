//! Conversion capabilities.
//!
//! [`DocumentConverter`] is the seam between the orchestrator and whatever
//! actually reads documents. It has one method per capability; each takes a
//! staged path (or a URL) plus the request's [`ConversionOptions`] and returns
//! pages in reading order, or a [`CapabilityError`] tagged for the retry
//! executor.
//!
//! [`VisionConverter`] is the implementation the service ships with. Tests
//! and embedders can supply their own.
//!
//! ## Data Flow of the default implementation
//!
//! ```text
//! docx/pptx ──▶ office ──┐
//!                        ▼
//! url ──▶ web ──(pdf)──▶ pdf ──▶ encode ──▶ llm ──▶ postprocess
//!          │                                 ▲
//!          └──(html)─────────────────────────┘
//! png/jpg ────────────────────▶ encode ──────┘
//! csv ──▶ table
//! ```

pub mod encode;
pub mod llm;
pub mod office;
pub mod pdf;
pub mod postprocess;
pub mod table;
pub mod vision;
pub mod web;

use crate::config::ConversionOptions;
use crate::error::{CapabilityError, DocToMdError};
use crate::format::{Capability, ImageType};
use crate::output::RawPage;
use async_trait::async_trait;
use std::path::Path;

pub use vision::VisionConverter;

/// A set of conversion capabilities, one per supported format.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert_pdf(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError>;

    async fn convert_docx(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError>;

    async fn convert_pptx(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError>;

    async fn convert_csv(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError>;

    async fn convert_image(
        &self,
        path: &Path,
        image_type: ImageType,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError>;

    async fn convert_url(
        &self,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError>;
}

/// Input handed to a capability.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    File(&'a Path),
    Url(&'a str),
}

/// Run the capability selected by the dispatcher.
///
/// Capability failures come back as [`DocToMdError::Upstream`] for the retry
/// executor to classify. An unwired capability fails with
/// [`DocToMdError::UnsupportedFormat`] without touching the converter.
pub async fn invoke(
    converter: &dyn DocumentConverter,
    capability: Capability,
    source: Source<'_>,
    options: &ConversionOptions,
) -> Result<Vec<RawPage>, DocToMdError> {
    let pages = match (capability, source) {
        (Capability::Unwired(format), _) => {
            return Err(DocToMdError::unsupported(
                format.extension(),
                format!("Fast mode không hỗ trợ file {}", format.extension()),
            ));
        }
        (Capability::Pdf, Source::File(path)) => converter.convert_pdf(path, options).await?,
        (Capability::Docx, Source::File(path)) => converter.convert_docx(path, options).await?,
        (Capability::Pptx, Source::File(path)) => converter.convert_pptx(path, options).await?,
        (Capability::Csv, Source::File(path)) => converter.convert_csv(path, options).await?,
        (Capability::Image(kind), Source::File(path)) => {
            converter.convert_image(path, kind, options).await?
        }
        (Capability::Url, Source::Url(url)) => converter.convert_url(url, options).await?,
        (capability, source) => {
            return Err(DocToMdError::Internal(format!(
                "capability '{}' cannot take source {:?}",
                capability.tag(),
                source
            )));
        }
    };
    Ok(pages)
}
