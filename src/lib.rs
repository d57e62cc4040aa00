//! # doctomd
//!
//! Convert uploaded documents and web pages to Markdown (or plain text).
//!
//! The crate is a conversion broker: it validates the declared file type,
//! stages the upload in a temporary file, hands it to a
//! [`DocumentConverter`], retries throttled calls with exponential backoff,
//! and normalises whatever comes back into a [`ConversionResponse`].
//!
//! ## Request flow
//!
//! ```text
//! upload / URL
//!  │
//!  ├─ 1. Dispatch   extension + mode → Capability (400 on unsupported)
//!  ├─ 2. Stage      bytes → uniquely named temp file
//!  ├─ 3. Convert    DocumentConverter, wrapped by the retry executor
//!  ├─ 4. Release    temp file removed on every path
//!  └─ 5. Normalize  page numbers, content lengths, totals
//! ```
//!
//! ## Modes
//!
//! | Mode | Formats | LLM |
//! |------|---------|-----|
//! | full | pdf, docx, pptx, csv, png, jpg, jpeg, URL | yes, when configured |
//! | fast | csv (`txt` passes the filter but has no converter) | never |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use doctomd::{ConversionMode, ConversionOptions, Orchestrator, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::from_env()?;
//!     let provider = doctomd::converter::llm::resolve_provider(&config)?;
//!     let orchestrator = Orchestrator::from_config(&config, provider)?;
//!
//!     let bytes = std::fs::read("report.csv")?;
//!     let response = orchestrator
//!         .convert_upload(&bytes, "report.csv", ConversionMode::Fast, ConversionOptions::fast())
//!         .await?;
//!     for page in response.pages {
//!         println!("{}", page.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `server` | on | HTTP API ([`server`]) and the `doctomd` binary |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod error;
pub mod format;
pub mod orchestrator;
pub mod output;
pub mod prompts;
pub mod retry;
pub mod staging;

#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionOptions, OutputType, ServiceConfig, ServiceConfigBuilder};
pub use converter::{DocumentConverter, Source, VisionConverter};
pub use error::{CapabilityError, DocToMdError, FailureKind};
pub use format::{Capability, ConversionMode, FileFormat, ImageType};
pub use orchestrator::{ConversionRequest, Orchestrator, RequestSource};
pub use output::{ConversionResponse, PageResult, RawPage};
pub use retry::RetryPolicy;
