//! File-type dispatch.
//!
//! The set of formats is closed: [`FileFormat`] enumerates every tag the
//! service knows, and [`resolve`] maps a (mode, source) pair to exactly one
//! [`Capability`] or rejects it with
//! [`DocToMdError::UnsupportedFormat`]. Resolution is pure; it runs before
//! anything is written to disk.

use crate::error::DocToMdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every file type the service recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Docx,
    Pptx,
    Csv,
    Png,
    Jpg,
    Jpeg,
    Txt,
}

impl FileFormat {
    pub const ALL: [FileFormat; 8] = [
        FileFormat::Pdf,
        FileFormat::Docx,
        FileFormat::Pptx,
        FileFormat::Csv,
        FileFormat::Png,
        FileFormat::Jpg,
        FileFormat::Jpeg,
        FileFormat::Txt,
    ];

    /// Case-insensitive lookup by extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Docx => "docx",
            FileFormat::Pptx => "pptx",
            FileFormat::Csv => "csv",
            FileFormat::Png => "png",
            FileFormat::Jpg => "jpg",
            FileFormat::Jpeg => "jpeg",
            FileFormat::Txt => "txt",
        }
    }

    /// Human-readable label used by `/supported-formats`.
    pub fn label(self) -> &'static str {
        match self {
            FileFormat::Pdf => "PDF documents",
            FileFormat::Docx => "Microsoft Word documents",
            FileFormat::Pptx => "Microsoft PowerPoint presentations",
            FileFormat::Csv => "Comma-separated values files",
            FileFormat::Png => "PNG images",
            FileFormat::Jpg | FileFormat::Jpeg => "JPEG images",
            FileFormat::Txt => "Plain text files",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Raster image encodings accepted by the image capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
}

impl ImageType {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
        }
    }
}

/// Request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// LLM-assisted, every format.
    Full,
    /// No LLM, restricted format set.
    Fast,
}

impl ConversionMode {
    /// Extensions accepted by this mode's filter, in display order.
    pub fn accepted(self) -> &'static [FileFormat] {
        match self {
            ConversionMode::Full => &[
                FileFormat::Pdf,
                FileFormat::Docx,
                FileFormat::Pptx,
                FileFormat::Csv,
                FileFormat::Png,
                FileFormat::Jpg,
                FileFormat::Jpeg,
            ],
            ConversionMode::Fast => &[FileFormat::Csv, FileFormat::Txt],
        }
    }

    pub fn accepts_url(self) -> bool {
        matches!(self, ConversionMode::Full)
    }

    fn rejection_message(self) -> String {
        let list = self
            .accepted()
            .iter()
            .map(|f| f.extension())
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            ConversionMode::Full => format!("Loại file không được hỗ trợ. Hỗ trợ: {list}"),
            ConversionMode::Fast => format!(
                "Fast mode chỉ hỗ trợ: {list}. Sử dụng /convert cho file phức tạp."
            ),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionMode::Full => f.write_str("full"),
            ConversionMode::Fast => f.write_str("fast"),
        }
    }
}

/// What kind of input a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind<'a> {
    /// An upload with the given (already extracted) extension.
    File(&'a str),
    /// A URL fetched by the capability itself.
    Url,
}

/// The conversion routine selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Pdf,
    Docx,
    Pptx,
    Csv,
    Image(ImageType),
    Url,
    /// Passed the mode's extension filter but has no converter wired.
    /// Invoking it fails with `UnsupportedFormat`.
    Unwired(FileFormat),
}

impl Capability {
    /// Tag reported as `file_type` in responses.
    pub fn tag(self) -> &'static str {
        match self {
            Capability::Pdf => "pdf",
            Capability::Docx => "docx",
            Capability::Pptx => "pptx",
            Capability::Csv => "csv",
            Capability::Image(ImageType::Png) => "png",
            Capability::Image(ImageType::Jpeg) => "jpeg",
            Capability::Url => "url",
            Capability::Unwired(f) => f.extension(),
        }
    }
}

/// Extension of a declared filename: the text after the last `.`,
/// lower-cased. A name without a dot yields an empty string.
pub fn extension_of(declared_name: &str) -> String {
    declared_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Map a mode and source to a capability, or reject it.
///
/// Pure: never touches the filesystem, so a rejected request has allocated
/// nothing.
pub fn resolve(mode: ConversionMode, source: SourceKind<'_>) -> Result<Capability, DocToMdError> {
    let ext = match source {
        SourceKind::Url if mode.accepts_url() => return Ok(Capability::Url),
        SourceKind::Url => "url",
        SourceKind::File(ext) => ext,
    };

    let format = FileFormat::from_extension(ext)
        .filter(|f| mode.accepted().contains(f))
        .ok_or_else(|| DocToMdError::unsupported(ext.to_ascii_lowercase(), mode.rejection_message()))?;

    let capability = match (mode, format) {
        (ConversionMode::Full, FileFormat::Pdf) => Capability::Pdf,
        (ConversionMode::Full, FileFormat::Docx) => Capability::Docx,
        (ConversionMode::Full, FileFormat::Pptx) => Capability::Pptx,
        (_, FileFormat::Csv) => Capability::Csv,
        (ConversionMode::Full, FileFormat::Png) => Capability::Image(ImageType::Png),
        (ConversionMode::Full, FileFormat::Jpg | FileFormat::Jpeg) => {
            Capability::Image(ImageType::Jpeg)
        }
        (_, other) => Capability::Unwired(other),
    };
    Ok(capability)
}

/// `extension → label` pairs for the full-mode format set.
pub fn supported_formats() -> Vec<(&'static str, &'static str)> {
    ConversionMode::Full
        .accepted()
        .iter()
        .map(|f| (f.extension(), f.label()))
        .collect()
}
