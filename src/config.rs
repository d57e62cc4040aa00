//! Service configuration and per-request conversion options.
//!
//! [`ServiceConfig`] is built once at startup (from the environment or via
//! [`ServiceConfigBuilder`]) and shared read-only by every request. Nothing
//! in here is mutated after the server starts.
//!
//! [`ConversionOptions`] are the three caller-supplied knobs that travel with
//! each request down to the conversion capability.

use crate::error::DocToMdError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Provider name reported by `/health` and used with the LLM factory.
pub const DEFAULT_LLM_PROVIDER: &str = "mistral";

/// Model used when `MISTRAL_MODEL` is not set.
pub const DEFAULT_LLM_MODEL: &str = "magistral-small-2509";

/// Configuration for the conversion service.
///
/// Built via [`ServiceConfig::builder()`], [`ServiceConfig::from_env()`] or
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use doctomd::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(8080)
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Bind host. Default: `0.0.0.0`.
    pub host: String,

    /// Bind port. Default: 8000.
    pub port: u16,

    /// Verbose logging. Default: true (mirrors `DEBUG=True` in the sample env).
    pub debug: bool,

    /// Emit logs as newline-delimited JSON. Default: false.
    pub log_json: bool,

    /// Mistral API key. `None` disables every LLM-assisted capability;
    /// the service still starts and serves CSV, text-layer PDF and HTML.
    /// Only a marker for [`ProviderFactory`](edgequake_llm::ProviderFactory),
    /// which reads the key from `MISTRAL_API_KEY` itself.
    pub mistral_api_key: Option<String>,

    /// LLM provider name. Default: `mistral`.
    pub llm_provider: String,

    /// LLM model identifier. Default: `magistral-small-2509`.
    pub llm_model: String,

    /// Pre-constructed LLM provider. Takes precedence over the API key.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Per-LLM-call timeout in seconds. Default: 15.
    pub llm_timeout_secs: u64,

    /// Sampling temperature for transcription calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per LLM call. Default: 4096.
    pub max_tokens: usize,

    /// Total attempts the retry executor makes per conversion. Default: 2.
    ///
    /// This bounds attempts, not retries after the first failure: with the
    /// default of 2 a throttled conversion is tried at most twice.
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; doubles per attempt. Default: 500.
    pub retry_base_delay_ms: u64,

    /// Timeout for `/convert-url` downloads in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Maximum accepted upload size in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Cap on the longest edge of a rasterised PDF page. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Concurrent LLM calls per multi-page document. Default: 4.
    pub page_concurrency: usize,

    /// Office-to-PDF converter executable used for DOCX/PPTX. Default: `soffice`.
    pub office_converter: String,

    /// Timeout for one office conversion in seconds. Default: 120.
    pub office_timeout_secs: u64,

    /// Directory (or file) of the pdfium shared library. `None` searches the
    /// system library path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Directory for staged uploads. `None` uses the OS temp dir.
    pub staging_dir: Option<PathBuf>,

    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: true,
            log_json: false,
            mistral_api_key: None,
            llm_provider: DEFAULT_LLM_PROVIDER.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            provider: None,
            llm_timeout_secs: 15,
            temperature: 0.1,
            max_tokens: 4096,
            max_attempts: 2,
            retry_base_delay_ms: 500,
            download_timeout_secs: 60,
            max_upload_bytes: 50 * 1024 * 1024,
            max_rendered_pixels: 2000,
            page_concurrency: 4,
            office_converter: "soffice".to_string(),
            office_timeout_secs: 120,
            pdfium_lib_path: None,
            staging_dir: None,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("mistral_api_key", &self.mistral_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_provider", &self.llm_provider)
            .field("llm_model", &self.llm_model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("office_converter", &self.office_converter)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build the configuration from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `MISTRAL_API_KEY` | `mistral_api_key` (empty counts as unset) |
    /// | `MISTRAL_MODEL` | `llm_model` |
    /// | `HOST`, `PORT`, `DEBUG` | bind address, verbosity |
    /// | `DOCTOMD_MAX_ATTEMPTS` | `max_attempts` |
    /// | `DOCTOMD_RETRY_BASE_DELAY_MS` | `retry_base_delay_ms` |
    /// | `DOCTOMD_LLM_TIMEOUT_SECS` | `llm_timeout_secs` |
    /// | `DOCTOMD_DOWNLOAD_TIMEOUT_SECS` | `download_timeout_secs` |
    /// | `DOCTOMD_MAX_UPLOAD_MB` | `max_upload_bytes` |
    /// | `DOCTOMD_OFFICE_CONVERTER` | `office_converter` |
    /// | `DOCTOMD_STAGING_DIR` | `staging_dir` |
    /// | `DOCTOMD_CORS_ORIGINS` | `cors_origins` (comma-separated) |
    /// | `DOCTOMD_LOG_JSON` | `log_json` |
    /// | `PDFIUM_LIB_PATH` | `pdfium_lib_path` |
    pub fn from_env() -> Result<Self, DocToMdError> {
        let d = Self::default();
        let mut builder = Self::builder()
            .host(env_or("HOST", &d.host))
            .port(parse_env("PORT", d.port))
            .debug(parse_bool_env("DEBUG", d.debug))
            .log_json(parse_bool_env("DOCTOMD_LOG_JSON", d.log_json))
            .llm_model(env_or("MISTRAL_MODEL", &d.llm_model))
            .max_attempts(parse_env("DOCTOMD_MAX_ATTEMPTS", d.max_attempts))
            .retry_base_delay_ms(parse_env("DOCTOMD_RETRY_BASE_DELAY_MS", d.retry_base_delay_ms))
            .llm_timeout_secs(parse_env("DOCTOMD_LLM_TIMEOUT_SECS", d.llm_timeout_secs))
            .download_timeout_secs(parse_env(
                "DOCTOMD_DOWNLOAD_TIMEOUT_SECS",
                d.download_timeout_secs,
            ))
            .max_upload_bytes(parse_env("DOCTOMD_MAX_UPLOAD_MB", 50usize) * 1024 * 1024)
            .office_converter(env_or("DOCTOMD_OFFICE_CONVERTER", &d.office_converter));

        if let Some(key) = non_empty_env("MISTRAL_API_KEY") {
            builder = builder.mistral_api_key(key);
        }
        if let Some(dir) = non_empty_env("DOCTOMD_STAGING_DIR") {
            builder = builder.staging_dir(dir);
        }
        if let Some(path) = non_empty_env("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_lib_path(path);
        }
        if let Some(origins) = non_empty_env("DOCTOMD_CORS_ORIGINS") {
            builder = builder.cors_origins(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }

        builder.build()
    }

    /// Whether LLM-assisted capabilities can be offered at all.
    pub fn llm_available(&self) -> bool {
        self.provider.is_some() || self.mistral_api_key.is_some()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.config.debug = v;
        self
    }

    pub fn log_json(mut self, v: bool) -> Self {
        self.config.log_json = v;
        self
    }

    /// Enables LLM-assisted capabilities. The provider factory still reads
    /// the key from `MISTRAL_API_KEY`, so this must match the environment;
    /// use [`provider`](Self::provider) to inject a client otherwise.
    pub fn mistral_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.mistral_api_key = Some(key.into());
        self
    }

    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm_model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn office_converter(mut self, exe: impl Into<String>) -> Self {
        self.config.office_converter = exe.into();
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_origins = origins;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DocToMdError> {
        let c = &self.config;
        if c.max_attempts > 10 {
            return Err(DocToMdError::InvalidConfig(format!(
                "max_attempts must be 0–10, got {}",
                c.max_attempts
            )));
        }
        if c.llm_timeout_secs == 0 {
            return Err(DocToMdError::InvalidConfig(
                "LLM timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(DocToMdError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.llm_model.trim().is_empty() {
            return Err(DocToMdError::InvalidConfig("LLM model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Per-request options ──────────────────────────────────────────────────

/// Requested output flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// GitHub-flavoured Markdown. (default)
    #[default]
    Markdown,
    /// Plain text with Markdown syntax removed.
    Text,
}

impl FromStr for OutputType {
    type Err = DocToMdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputType::Markdown),
            "text" | "txt" => Ok(OutputType::Text),
            other => Err(DocToMdError::InvalidRequest(format!(
                "output_type must be 'markdown' or 'text', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputType::Markdown => f.write_str("markdown"),
            OutputType::Text => f.write_str("text"),
        }
    }
}

/// Caller-supplied options for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub extract_images: bool,
    pub extract_tables: bool,
    pub output_type: OutputType,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            extract_images: true,
            extract_tables: true,
            output_type: OutputType::Markdown,
        }
    }
}

impl ConversionOptions {
    /// Defaults for the LLM-free fast endpoint: no image or table extraction.
    pub fn fast() -> Self {
        Self {
            extract_images: false,
            extract_tables: false,
            output_type: OutputType::Markdown,
        }
    }
}

/// Parse a form-encoded boolean as HTML forms and script clients send it.
pub fn parse_form_bool(field: &str, value: &str) -> Result<bool, DocToMdError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        other => Err(DocToMdError::InvalidRequest(format!(
            "{field} must be a boolean, got '{other}'"
        ))),
    }
}

// ── private helpers ──────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_form_bool(key, &v).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let c = ServiceConfig::default();
        assert_eq!(c.max_attempts, 2);
        assert_eq!(c.retry_base_delay(), Duration::from_millis(500));
        assert_eq!(c.llm_model, "magistral-small-2509");
        assert_eq!(c.llm_timeout(), Duration::from_secs(15));
        assert!(!c.llm_available());
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ServiceConfig::builder().llm_timeout_secs(0).build();
        assert!(matches!(err, Err(DocToMdError::InvalidConfig(_))));
    }

    #[test]
    fn api_key_enables_llm() {
        let c = ServiceConfig::builder()
            .mistral_api_key("sk-test")
            .build()
            .unwrap();
        assert!(c.llm_available());
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-test"), "api key must be redacted: {dbg}");
    }

    #[test]
    fn options_defaults() {
        let o = ConversionOptions::default();
        assert!(o.extract_images && o.extract_tables);
        assert_eq!(o.output_type, OutputType::Markdown);
        let f = ConversionOptions::fast();
        assert!(!f.extract_images && !f.extract_tables);
    }

    #[test]
    fn output_type_parsing() {
        assert_eq!("Markdown".parse::<OutputType>().unwrap(), OutputType::Markdown);
        assert_eq!("text".parse::<OutputType>().unwrap(), OutputType::Text);
        assert!("html".parse::<OutputType>().is_err());
    }

    #[test]
    fn form_bool_parsing() {
        assert!(parse_form_bool("x", "True").unwrap());
        assert!(!parse_form_bool("x", "0").unwrap());
        assert!(parse_form_bool("x", "maybe").is_err());
    }
}
