//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use doctomd::{CapabilityError, ConversionOptions, DocumentConverter, ImageType, RawPage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted converter: fails the first `throttle` calls with a rate-limit
/// error, then answers every capability with `pages` pages.
///
/// Records each staged path it was handed, whether the file existed at
/// that moment, and the options of every call. With `hang` set, file
/// capabilities never complete.
#[derive(Debug, Default)]
pub struct MockConverter {
    pub pages: usize,
    pub throttle: usize,
    pub permanent: Option<String>,
    pub hang: bool,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(PathBuf, bool)>>,
    pub options: Mutex<Vec<ConversionOptions>>,
}

impl MockConverter {
    pub fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn throttled(times: usize, pages: usize) -> Self {
        Self {
            pages,
            throttle: times,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            permanent: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_paths(&self) -> Vec<(PathBuf, bool)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_options(&self) -> Vec<ConversionOptions> {
        self.options.lock().unwrap().clone()
    }

    fn answer(
        &self,
        label: &str,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.options.lock().unwrap().push(*options);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.throttle {
            return Err(CapabilityError::rate_limited("429 Too Many Requests"));
        }
        if let Some(ref message) = self.permanent {
            return Err(CapabilityError::permanent(message.clone()));
        }
        Ok((1..=self.pages)
            .map(|n| RawPage::new(n, format!("# {label} page {n}\n")))
            .collect())
    }

    async fn file(
        &self,
        path: &Path,
        label: &str,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.seen
            .lock()
            .unwrap()
            .push((path.to_path_buf(), path.exists()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.answer(label, options)
    }
}

#[async_trait]
impl DocumentConverter for MockConverter {
    async fn convert_pdf(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.file(path, "pdf", options).await
    }

    async fn convert_docx(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.file(path, "docx", options).await
    }

    async fn convert_pptx(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.file(path, "pptx", options).await
    }

    async fn convert_csv(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.file(path, "csv", options).await
    }

    async fn convert_image(
        &self,
        path: &Path,
        _image_type: ImageType,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.file(path, "image", options).await
    }

    async fn convert_url(
        &self,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<Vec<RawPage>, CapabilityError> {
        self.answer(url, options)
    }
}

/// Files left in `dir`.
pub fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

/// A five-row CSV with a header.
pub const PEOPLE_CSV: &str = "name,age,city\n\
Alice,30,Hanoi\n\
Bob,25,Hue\n\
Chi,41,Da Nang\n\
Dung,35,Can Tho\n\
Em,28,Vinh\n";
