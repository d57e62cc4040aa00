//! PDF access via pdfium: page rasterisation and text-layer extraction.
//!
//! pdfium keeps thread-local state and is CPU-bound, so every call runs
//! under `tokio::task::spawn_blocking`. The shared library is bound per call
//! from `pdfium_lib_path` (file or directory) or the system search path; a
//! missing library is reported as [`FailureKind::OcrUnavailable`] rather
//! than a panic.
//!
//! Rendering caps the longest edge at `max_pixels` instead of fixing a DPI,
//! which keeps memory bounded on oversized pages.
//!
//! [`FailureKind::OcrUnavailable`]: crate::error::FailureKind::OcrUnavailable

use crate::error::CapabilityError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Rasterise every page of a PDF, in page order.
pub async fn render_pages(
    pdf_path: &Path,
    lib_path: Option<&Path>,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, CapabilityError> {
    let path = pdf_path.to_path_buf();
    let lib = lib_path.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, lib.as_deref(), max_pixels))
        .await
        .map_err(|e| CapabilityError::permanent(format!("Render task panicked: {e}")))?
}

/// Extract the embedded text layer of every page, in page order.
pub async fn extract_text(
    pdf_path: &Path,
    lib_path: Option<&Path>,
) -> Result<Vec<String>, CapabilityError> {
    let path = pdf_path.to_path_buf();
    let lib = lib_path.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || extract_text_blocking(&path, lib.as_deref()))
        .await
        .map_err(|e| CapabilityError::permanent(format!("Text extraction task panicked: {e}")))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    lib_path: Option<&Path>,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, CapabilityError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf_path)?;
    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::new();
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            CapabilityError::permanent(format!("Failed to render page {}: {e:?}", idx + 1))
        })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }
    Ok(images)
}

fn extract_text_blocking(
    pdf_path: &Path,
    lib_path: Option<&Path>,
) -> Result<Vec<String>, CapabilityError> {
    let pdfium = bind(lib_path)?;
    let document = open(&pdfium, pdf_path)?;

    document
        .pages()
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            page.text().map(|t| t.all()).map_err(|e| {
                CapabilityError::permanent(format!(
                    "Failed to read text of page {}: {e:?}",
                    idx + 1
                ))
            })
        })
        .collect()
}

fn bind(lib_path: Option<&Path>) -> Result<Pdfium, CapabilityError> {
    let bindings = match lib_path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| {
        CapabilityError::ocr_unavailable(format!(
            "pdfium library not available ({}): {e:?}",
            describe(lib_path)
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, CapabilityError> {
    pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            CapabilityError::permanent("PDF is password-protected")
        } else {
            CapabilityError::permanent(format!("Invalid or corrupt PDF: {detail}"))
        }
    })
}

fn describe(lib_path: Option<&Path>) -> String {
    lib_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "system library path".to_string())
}
