//! The default [`DocumentConverter`]: a vision LLM over rendered pages.
//!
//! With a provider, every page image (PDF page, converted office page or
//! uploaded picture) is transcribed by the model, up to `page_concurrency`
//! calls at a time, and the results keep page order. Without one, PDFs fall
//! back to their embedded text layer, CSV and web pages still work, and
//! image uploads fail as [`FailureKind::OcrUnavailable`].
//!
//! [`FailureKind::OcrUnavailable`]: crate::error::FailureKind::OcrUnavailable

use super::llm::{self, LlmSettings};
use super::{encode, office, pdf, postprocess, table, web, DocumentConverter};
use crate::config::{ConversionOptions, OutputType, ServiceConfig};
use crate::error::{CapabilityError, DocToMdError};
use crate::format::ImageType;
use crate::output::RawPage;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::LLMProvider;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Web text beyond this many characters is cut before the LLM rewrite.
const MAX_WEB_CHARS: usize = 60_000;

pub struct VisionConverter {
    provider: Option<Arc<dyn LLMProvider>>,
    settings: LlmSettings,
    pdfium_lib_path: Option<PathBuf>,
    max_rendered_pixels: u32,
    page_concurrency: usize,
    office_converter: String,
    office_timeout: Duration,
    http: reqwest::Client,
    max_download_bytes: usize,
}

impl std::fmt::Debug for VisionConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConverter")
            .field("llm", &self.provider.is_some())
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("page_concurrency", &self.page_concurrency)
            .field("office_converter", &self.office_converter)
            .finish()
    }
}

impl VisionConverter {
    /// Converter backed by `provider` (or text-only when `None`).
    pub fn new(
        config: &ServiceConfig,
        provider: Option<Arc<dyn LLMProvider>>,
    ) -> Result<Self, DocToMdError> {
        let http = web::client(Duration::from_secs(config.download_timeout_secs))
            .map_err(|e| DocToMdError::InvalidConfig(e.message))?;
        Ok(Self {
            provider,
            settings: LlmSettings::from_config(config),
            pdfium_lib_path: config.pdfium_lib_path.clone(),
            max_rendered_pixels: config.max_rendered_pixels,
            page_concurrency: config.page_concurrency.max(1),
            office_converter: config.office_converter.clone(),
            office_timeout: Duration::from_secs(config.office_timeout_secs),
            http,
            max_download_bytes: config.max_upload_bytes,
        })
    }

    /// Converter that never calls an LLM (fast mode).
    pub fn without_llm(config: &ServiceConfig) -> Result<Self, DocToMdError> {
        Self::new(config, None)
    }

    fn require_llm(&self, what: &str) -> Result<&Arc<dyn LLMProvider>, CapabilityError> {
        self.provider.as_ref().ok_or_else(|| {
            CapabilityError::ocr_unavailable(format!(
                "{what} needs a vision model, but no LLM is configured (set MISTRAL_API_KEY)"
            ))
        })
    }

    /// PDF → pages, through the model when available, else the text layer.
    async fn pdf_pages(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        match self.provider {
            Some(ref provider) => self.transcribe_pdf(provider, path, options).await,
            None => self.text_layer(path, options).await,
        }
    }

    async fn transcribe_pdf(
        &self,
        provider: &Arc<dyn LLMProvider>,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        let start = Instant::now();
        let images =
            pdf::render_pages(path, self.pdfium_lib_path.as_deref(), self.max_rendered_pixels)
                .await?;
        let total = images.len();

        let encoded = tokio::task::spawn_blocking(move || {
            images.iter().map(encode::encode_page).collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| CapabilityError::permanent(format!("Encode task panicked: {e}")))??;

        let prompt = prompts::page_prompt(options);
        let output_type = options.output_type;
        let settings = self.settings;

        let pages: Vec<RawPage> = stream::iter(encoded.into_iter().enumerate().map(|(idx, image)| {
            let provider = Arc::clone(provider);
            let prompt = &prompt;
            async move {
                let page_number = idx + 1;
                let raw = llm::transcribe_image(&provider, &settings, prompt, image, page_number).await?;
                Ok::<_, CapabilityError>(RawPage::new(page_number, postprocess::finish(&raw, output_type)))
            }
        }))
        .buffered(self.page_concurrency)
        .try_collect()
        .await?;

        info!("Transcribed {} pages in {:?}", total, start.elapsed());
        Ok(pages)
    }

    async fn text_layer(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        let texts = pdf::extract_text(path, self.pdfium_lib_path.as_deref()).await?;
        if !texts.is_empty() && texts.iter().all(|t| t.trim().is_empty()) {
            return Err(CapabilityError::ocr_unavailable(
                "PDF has no text layer and no LLM is configured for OCR",
            ));
        }
        debug!("Read text layer of {} pages", texts.len());
        Ok(texts
            .iter()
            .enumerate()
            .map(|(idx, text)| RawPage::new(idx + 1, postprocess::finish(text, options.output_type)))
            .collect())
    }

    async fn office_pages(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        let converted =
            office::convert_to_pdf(&self.office_converter, path, self.office_timeout).await?;
        self.pdf_pages(converted.path(), options).await
    }

    async fn web_page(
        &self,
        url: &str,
        text: &str,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        if text.trim().is_empty() {
            return Err(CapabilityError::permanent(format!("No readable content at {url}")));
        }
        let content = match self.provider {
            Some(ref provider) => {
                let text: String = text.chars().take(MAX_WEB_CHARS).collect();
                let raw = llm::complete_text(
                    provider,
                    &self.settings,
                    &prompts::web_prompt(options),
                    &prompts::web_user_message(url, &text),
                )
                .await?;
                postprocess::finish(&raw, options.output_type)
            }
            None => match options.output_type {
                OutputType::Markdown => postprocess::clean_markdown(text),
                OutputType::Text => postprocess::finish(text, OutputType::Text),
            },
        };
        Ok(vec![RawPage::new(1, content)])
    }
}

#[async_trait]
impl DocumentConverter for VisionConverter {
    async fn convert_pdf(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.pdf_pages(path, options).await
    }

    async fn convert_docx(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.office_pages(path, options).await
    }

    async fn convert_pptx(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.office_pages(path, options).await
    }

    async fn convert_csv(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        table::convert_csv(path, options).await
    }

    async fn convert_image(
        &self,
        path: &Path,
        image_type: ImageType,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        let provider = self.require_llm("Image transcription")?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CapabilityError::permanent(format!("Failed to read image: {e}")))?;
        let image = encode::encode_upload(&bytes, image_type)?;

        let raw = llm::transcribe_image(
            provider,
            &self.settings,
            &prompts::page_prompt(options),
            image,
            1,
        )
        .await?;
        Ok(vec![RawPage::new(1, postprocess::finish(&raw, options.output_type))])
    }

    async fn convert_url(
        &self,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        match web::fetch(&self.http, url, self.max_download_bytes).await? {
            web::Fetched::Pdf(tmp) => self.pdf_pages(&tmp, options).await,
            web::Fetched::Html(text) | web::Fetched::Text(text) => {
                self.web_page(url, &text, options).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn text_only() -> VisionConverter {
        VisionConverter::without_llm(&ServiceConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn image_without_llm_is_ocr_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let err = text_only()
            .convert_image(&path, ImageType::Png, &ConversionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::OcrUnavailable);
    }

    #[tokio::test]
    async fn csv_works_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let pages = text_only()
            .convert_csv(&path, &ConversionOptions::fast())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].content.contains("| 1 | 2 |"));
    }

    #[tokio::test]
    async fn web_text_without_llm_is_one_page() {
        let pages = text_only()
            .web_page("https://a.b", "Hello\n\n\n\n\nworld", &ConversionOptions::default())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content, "Hello\n\n\nworld\n");
    }

    #[tokio::test]
    async fn empty_web_text_is_permanent() {
        let err = text_only()
            .web_page("https://a.b", "   ", &ConversionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", text_only());
        assert!(dbg.contains("llm: false"));
    }
}
