//! URL capability: download a page or document.
//!
//! PDF bodies (by content type or `%PDF` magic) are written to a temp file
//! and take the PDF path; anything else is decoded as text, with HTML
//! reduced to its visible text first.

use crate::error::CapabilityError;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, info};

/// A downloaded body, classified.
#[derive(Debug)]
pub enum Fetched {
    /// PDF saved to a temp file, removed when dropped.
    Pdf(TempPath),
    /// Visible text of an HTML page.
    Html(String),
    /// Any other textual body.
    Text(String),
}

/// Build the HTTP client used for downloads.
pub fn client(timeout: Duration) -> Result<reqwest::Client, CapabilityError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("doctomd/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CapabilityError::permanent(format!("Failed to build HTTP client: {e}")))
}

/// Download `url` and classify the body.
///
/// Bodies larger than `max_bytes` are abandoned mid-stream.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<Fetched, CapabilityError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| CapabilityError::permanent(format!("Invalid URL '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CapabilityError::permanent(format!(
            "Unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    info!("Downloading {}", url);
    let response = client.get(parsed).send().await.map_err(|e| {
        if e.is_timeout() {
            CapabilityError::permanent(format!("Download timed out: {url}"))
        } else {
            CapabilityError::permanent(format!("Download failed: {e}"))
        }
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(CapabilityError::rate_limited(format!("HTTP 429 from {url}")));
    }
    if !status.is_success() {
        return Err(CapabilityError::permanent(format!("Download failed: HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(too_large(max_bytes));
        }
    }

    let mut bytes = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| CapabilityError::permanent(format!("Download failed: {e}")))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large(max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }
    debug!("Downloaded {} bytes ({})", bytes.len(), content_type);

    classify_off_runtime(content_type, bytes).await
}

/// [`classify_body`] on the blocking pool: saving a PDF body and scrubbing
/// HTML both block.
async fn classify_off_runtime(
    content_type: String,
    bytes: Vec<u8>,
) -> Result<Fetched, CapabilityError> {
    tokio::task::spawn_blocking(move || classify_body(&content_type, &bytes))
        .await
        .map_err(|e| CapabilityError::permanent(format!("Body classification task panicked: {e}")))?
}

fn too_large(max_bytes: usize) -> CapabilityError {
    CapabilityError::permanent(format!(
        "Downloaded document exceeds the maximum of {max_bytes} bytes"
    ))
}

/// Decide what a downloaded body is.
pub fn classify_body(content_type: &str, bytes: &[u8]) -> Result<Fetched, CapabilityError> {
    if content_type.contains("application/pdf") || bytes.starts_with(b"%PDF") {
        return save_pdf(bytes).map(Fetched::Pdf);
    }

    let text = String::from_utf8_lossy(bytes);
    let head: String = text.trim_start().chars().take(15).collect::<String>().to_ascii_lowercase();
    let looks_html = content_type.contains("html")
        || head.starts_with("<!doctype html")
        || head.starts_with("<html");

    if looks_html {
        Ok(Fetched::Html(html_to_text(&text)))
    } else if content_type.is_empty() || content_type.starts_with("text/") || content_type.contains("json") {
        Ok(Fetched::Text(text.into_owned()))
    } else {
        Err(CapabilityError::permanent(format!(
            "Unsupported content type '{content_type}'"
        )))
    }
}

fn save_pdf(bytes: &[u8]) -> Result<TempPath, CapabilityError> {
    let mut file = tempfile::Builder::new()
        .prefix("doctomd-url-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| CapabilityError::permanent(format!("Failed to store downloaded PDF: {e}")))?;
    file.write_all(bytes)
        .map_err(|e| CapabilityError::permanent(format!("Failed to store downloaded PDF: {e}")))?;
    Ok(file.into_temp_path())
}

static RE_HIDDEN: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "noscript", "head", "svg", "nav", "footer"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b.*?</{tag}\s*>")).expect("valid regex"))
        .collect()
});
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static RE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|section|article|h[1-6]|tr|table|ul|ol|blockquote|pre)\s*>")
        .expect("valid regex")
});
static RE_LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"));
static RE_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("valid regex"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{A0}]+").expect("valid regex"));
static RE_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Reduce HTML to its visible text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let mut s = RE_COMMENT.replace_all(html, "").into_owned();
    for re in RE_HIDDEN.iter() {
        s = re.replace_all(&s, "").into_owned();
    }
    let s = RE_BREAK.replace_all(&s, "\n");
    let s = RE_LIST_ITEM.replace_all(&s, "\n- ");
    let s = RE_CELL.replace_all(&s, "\t");
    let s = RE_TAG.replace_all(&s, "");
    let s = decode_entities(&s);
    let s = RE_SPACES.replace_all(&s, " ");

    let lines: Vec<&str> = s.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    RE_BLANKS.replace_all(&joined, "\n\n").trim().to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
