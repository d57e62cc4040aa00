//! Image encoding for VLM requests.
//!
//! Rendered PDF pages are encoded as PNG, which is lossless and keeps small
//! print legible. Uploaded images are passed through in their own encoding
//! after a decode check, so a corrupt upload fails here rather than at the
//! provider.

use crate::error::CapabilityError;
use crate::format::ImageType;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, CapabilityError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| CapabilityError::permanent(format!("PNG encoding failed: {e}")))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Wrap uploaded image bytes for a VLM request.
///
/// The bytes must decode as `image_type`; the original encoding is sent
/// unchanged.
pub fn encode_upload(bytes: &[u8], image_type: ImageType) -> Result<ImageData, CapabilityError> {
    let format = match image_type {
        ImageType::Png => image::ImageFormat::Png,
        ImageType::Jpeg => image::ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CapabilityError::permanent(format!("Invalid image file: {e}")))?;
    debug!(
        "Image upload {}x{} ({})",
        decoded.width(),
        decoded.height(),
        image_type.mime_type()
    );

    Ok(ImageData::new(STANDARD.encode(bytes), image_type.mime_type()).with_detail("high"))
}
