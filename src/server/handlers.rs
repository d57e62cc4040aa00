//! Request handlers.

use super::error::{ApiError, Endpoint};
use super::AppState;
use crate::config::{parse_form_bool, ConversionOptions, OutputType};
use crate::error::DocToMdError;
use crate::format::{self, ConversionMode};
use crate::output::ConversionResponse;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

type Shared = State<Arc<AppState>>;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "DocToMarkdown API đang hoạt động!" }))
}

pub async fn health(State(state): Shared) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "llm_available": state.info.llm_available,
        "llm_provider": state.info.llm_provider,
        "llm_model": state.info.llm_model,
    }))
}

pub async fn supported_formats(State(state): Shared) -> Json<Value> {
    let formats: Map<String, Value> = format::supported_formats()
        .into_iter()
        .map(|(ext, label)| (ext.to_string(), Value::from(label)))
        .collect();

    Json(json!({
        "supported_formats": formats,
        "url_support": true,
        "llm_available": state.info.llm_available,
        "llm_provider": state.info.llm_provider,
        "llm_model": state.info.llm_model,
    }))
}

pub async fn convert(
    State(state): Shared,
    multipart: Multipart,
) -> Result<Json<ConversionResponse>, ApiError> {
    upload(&state, multipart, ConversionMode::Full, Endpoint::Convert).await
}

pub async fn convert_fast(
    State(state): Shared,
    multipart: Multipart,
) -> Result<Json<ConversionResponse>, ApiError> {
    upload(&state, multipart, ConversionMode::Fast, Endpoint::ConvertFast).await
}

async fn upload(
    state: &AppState,
    multipart: Multipart,
    mode: ConversionMode,
    endpoint: Endpoint,
) -> Result<Json<ConversionResponse>, ApiError> {
    let defaults = match mode {
        ConversionMode::Full => ConversionOptions::default(),
        ConversionMode::Fast => ConversionOptions::fast(),
    };
    let form = read_form(multipart, defaults, state.max_upload_bytes)
        .await
        .map_err(|e| ApiError::conversion(endpoint, e))?;

    let (file_name, bytes) = form
        .file
        .ok_or_else(|| ApiError::bad_request("Missing 'file' field in multipart form"))?;

    state
        .orchestrator
        .convert_upload(&bytes, &file_name, mode, form.options)
        .await
        .map(Json)
        .map_err(|e| ApiError::conversion(endpoint, e))
}

/// Body of `/convert-url` in any of its encodings.
#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
    #[serde(default = "default_true", deserialize_with = "form_bool")]
    pub extract_images: bool,
    #[serde(default = "default_true", deserialize_with = "form_bool")]
    pub extract_tables: bool,
    #[serde(default)]
    pub output_type: OutputType,
}

fn default_true() -> bool {
    true
}

/// JSON sends real booleans; URL-encoded forms send text such as `True`
/// or `0`, which gets the same reading as a multipart field.
fn form_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrText {
        Bool(bool),
        Text(String),
    }

    match BoolOrText::deserialize(deserializer)? {
        BoolOrText::Bool(b) => Ok(b),
        BoolOrText::Text(text) => {
            parse_form_bool("boolean field", &text).map_err(serde::de::Error::custom)
        }
    }
}

impl UrlRequest {
    fn options(&self) -> ConversionOptions {
        ConversionOptions {
            extract_images: self.extract_images,
            extract_tables: self.extract_tables,
            output_type: self.output_type,
        }
    }
}

/// `/convert-url` accepts JSON, URL-encoded and multipart bodies.
pub async fn convert_url(
    State(state): Shared,
    request: Request,
) -> Result<Json<ConversionResponse>, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (url, options) = if content_type.starts_with("application/json") {
        let Json(body) = Json::<UrlRequest>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        (body.url.clone(), body.options())
    } else if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let form = read_form(multipart, ConversionOptions::default(), state.max_upload_bytes)
            .await
            .map_err(|e| ApiError::conversion(Endpoint::ConvertUrl, e))?;
        let url = form
            .url
            .ok_or_else(|| ApiError::bad_request("Missing 'url' field"))?;
        (url, form.options)
    } else {
        let Form(body) = Form::<UrlRequest>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        (body.url.clone(), body.options())
    };

    state
        .orchestrator
        .convert_url(&url, options)
        .await
        .map(Json)
        .map_err(|e| ApiError::conversion(Endpoint::ConvertUrl, e))
}

/// Fields collected from a multipart form.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>)>,
    url: Option<String>,
    options: ConversionOptions,
}

/// Read the multipart body, enforcing the upload limit while streaming.
///
/// Unknown fields are ignored; malformed option values are a 400.
async fn read_form(
    mut multipart: Multipart,
    defaults: ConversionOptions,
    max_bytes: usize,
) -> Result<UploadForm, DocToMdError> {
    let mut form = UploadForm {
        options: defaults,
        ..UploadForm::default()
    };

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            DocToMdError::PayloadTooLarge {
                size: max_bytes.saturating_add(1),
                limit: max_bytes,
            }
        } else {
            DocToMdError::InvalidRequest(format!("Failed to read multipart field: {}", e.body_text()))
        }
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    DocToMdError::InvalidRequest(format!("Failed to read file chunk: {}", e.body_text()))
                })? {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() > max_bytes {
                        return Err(DocToMdError::PayloadTooLarge {
                            size: bytes.len(),
                            limit: max_bytes,
                        });
                    }
                }
                debug!("received file '{}' ({} bytes)", file_name, bytes.len());
                form.file = Some((file_name, bytes));
            }
            "extract_images" => {
                form.options.extract_images = parse_form_bool(&name, &text(field).await?)?;
            }
            "extract_tables" => {
                form.options.extract_tables = parse_form_bool(&name, &text(field).await?)?;
            }
            "output_type" => {
                form.options.output_type = text(field).await?.parse()?;
            }
            "url" => form.url = Some(text(field).await?.trim().to_string()),
            other => debug!("ignoring multipart field '{}'", other),
        }
    }
    Ok(form)
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, DocToMdError> {
    field
        .text()
        .await
        .map_err(|e| DocToMdError::InvalidRequest(format!("Invalid form field: {}", e.body_text())))
}
