//! HTTP surface: routing, form parsing and error bodies.

#![cfg(feature = "server")]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{MockConverter, PEOPLE_CSV};
use doctomd::server::{router, AppState};
use doctomd::{Orchestrator, RetryPolicy, ServiceConfig};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "----doctomd-test-boundary";

fn app_with(full: Arc<MockConverter>, config: &ServiceConfig, llm: bool) -> Router {
    let orch = Orchestrator::new(
        full,
        Arc::new(MockConverter::with_pages(1)),
        RetryPolicy::new(2, Duration::from_millis(1)),
    )
    .with_max_upload_bytes(config.max_upload_bytes);
    router(Arc::new(AppState::new(Arc::new(orch), config, llm)))
}

fn app(full: Arc<MockConverter>) -> Router {
    app_with(full, &ServiceConfig::default(), true)
}

/// Hand-built multipart body: one file part plus plain text fields.
fn multipart(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post_multipart(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn root_reports_liveness() {
    let (status, body) = send(
        app(Arc::new(MockConverter::default())),
        Request::get("/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "DocToMarkdown API đang hoạt động!");
}

#[tokio::test]
async fn health_reports_llm_state() {
    let (status, body) = send(
        app(Arc::new(MockConverter::default())),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["llm_available"], true);
    assert_eq!(body["llm_provider"], "mistral");
    assert!(body["llm_model"].is_string());
}

#[tokio::test]
async fn health_without_llm_has_null_model() {
    let app = app_with(
        Arc::new(MockConverter::default()),
        &ServiceConfig::default(),
        false,
    );
    let (_, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(body["llm_available"], false);
    assert!(body["llm_model"].is_null());
}

#[tokio::test]
async fn supported_formats_lists_full_mode_set() {
    let (status, body) = send(
        app(Arc::new(MockConverter::default())),
        Request::get("/supported-formats").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url_support"], true);
    let formats = body["supported_formats"].as_object().unwrap();
    for ext in ["pdf", "docx", "pptx", "csv", "png", "jpg", "jpeg"] {
        assert!(formats.contains_key(ext), "missing {ext}");
    }
    assert!(!formats.contains_key("txt"));
}

#[tokio::test]
async fn convert_pdf_returns_pages() {
    let full = Arc::new(MockConverter::with_pages(2));
    let body = multipart(
        Some(("paper.pdf", b"%PDF-1.7".as_slice())),
        &[("extract_images", "false"), ("output_type", "markdown")],
    );
    let (status, body) = send(app(full.clone()), post_multipart("/convert", body)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["file_type"], "pdf");
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["pages"][1]["page_number"], 2);
    assert_eq!(body["message"], "Chuyển đổi thành công paper.pdf");
    assert_eq!(full.calls(), 1);
}

#[tokio::test]
async fn convert_unknown_extension_is_400() {
    let full = Arc::new(MockConverter::with_pages(1));
    let body = multipart(Some(("archive.xyz", b"data".as_slice())), &[]);
    let (status, body) = send(app(full.clone()), post_multipart("/convert", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unsupported_format");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Loại file không được hỗ trợ"));
    assert_eq!(full.calls(), 0);
}

#[tokio::test]
async fn convert_file_without_extension_is_400() {
    let body = multipart(Some(("Makefile", b"all:".as_slice())), &[]);
    let (status, _) = send(
        app(Arc::new(MockConverter::with_pages(1))),
        post_multipart("/convert", body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn convert_without_file_is_400() {
    let body = multipart(None, &[("extract_tables", "true")]);
    let (status, body) = send(
        app(Arc::new(MockConverter::with_pages(1))),
        post_multipart("/convert", body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn convert_rejects_malformed_flag() {
    let body = multipart(Some(("a.pdf", b"%PDF".as_slice())), &[("extract_images", "maybe")]);
    let (status, _) = send(
        app(Arc::new(MockConverter::with_pages(1))),
        post_multipart("/convert", body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn convert_oversized_upload_is_413() {
    let config = ServiceConfig::builder().max_upload_bytes(16).build().unwrap();
    let full = Arc::new(MockConverter::with_pages(1));
    let body = multipart(Some(("big.pdf", [b'x'; 64].as_slice())), &[]);
    let (status, body) = send(
        app_with(full.clone(), &config, true),
        post_multipart("/convert", body),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload_too_large");
    assert_eq!(full.calls(), 0);
}

#[tokio::test]
async fn convert_persistent_throttling_is_429() {
    let full = Arc::new(MockConverter::throttled(usize::MAX, 1));
    let body = multipart(Some(("scan.jpg", b"\xff\xd8\xff".as_slice())), &[]);
    let (status, body) = send(app(full.clone()), post_multipart("/convert", body)).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["detail"], "API rate limit exceeded. Vui lòng thử lại sau.");
    assert_eq!(full.calls(), 2);
}

#[tokio::test]
async fn convert_permanent_failure_is_500_with_prefix() {
    let full = Arc::new(MockConverter::failing("document is encrypted"));
    let body = multipart(Some(("locked.docx", b"PK".as_slice())), &[]);
    let (status, body) = send(app(full), post_multipart("/convert", body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Lỗi khi chuyển đổi: document is encrypted");
}

#[tokio::test]
async fn convert_fast_txt_is_400() {
    let body = multipart(Some(("notes.txt", b"plain words".as_slice())), &[]);
    let (status, body) = send(
        app(Arc::new(MockConverter::with_pages(1))),
        post_multipart("/convert-fast", body),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Fast mode không hỗ trợ file txt");
}

#[tokio::test]
async fn convert_fast_pdf_is_400() {
    let body = multipart(Some(("a.pdf", b"%PDF".as_slice())), &[]);
    let (status, body) = send(
        app(Arc::new(MockConverter::with_pages(1))),
        post_multipart("/convert-fast", body),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("Sử dụng /convert cho file phức tạp"));
}

#[tokio::test]
async fn convert_fast_csv_uses_real_table_converter() {
    let orch = Orchestrator::from_config(&ServiceConfig::default(), None).unwrap();
    let state = AppState::new(Arc::new(orch), &ServiceConfig::default(), false);
    let body = multipart(Some(("people.csv", PEOPLE_CSV.as_bytes())), &[]);

    let (status, body) = send(
        router(Arc::new(state)),
        post_multipart("/convert-fast", body),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file_type"], "csv");
    assert_eq!(body["total_pages"], 1);
    let content = body["pages"][0]["content"].as_str().unwrap();
    assert!(content.contains("| Alice | 30"));
    assert_eq!(
        body["pages"][0]["content_length"],
        content.chars().count()
    );
}

#[tokio::test]
async fn convert_image_without_llm_reports_ocr_unavailable() {
    let orch = Orchestrator::from_config(&ServiceConfig::default(), None).unwrap();
    let state = AppState::new(Arc::new(orch), &ServiceConfig::default(), false);
    let body = multipart(Some(("scan.png", b"\x89PNG\r\n".as_slice())), &[]);

    let (status, body) = send(router(Arc::new(state)), post_multipart("/convert", body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "ocr_unavailable");
    assert!(body["detail"].as_str().unwrap().starts_with("OCR service không khả dụng"));
}

#[tokio::test]
async fn convert_url_accepts_json() {
    let full = Arc::new(MockConverter::with_pages(1));
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"url":"https://example.com/a","output_type":"text"}"#,
        ))
        .unwrap();

    let (status, body) = send(app(full.clone()), request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file_type"], "url");
    assert_eq!(body["message"], "Chuyển đổi URL thành công: https://example.com/a");
    assert_eq!(full.calls(), 1);
}

#[tokio::test]
async fn convert_url_accepts_urlencoded_form() {
    let full = Arc::new(MockConverter::with_pages(1));
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("url=https%3A%2F%2Fexample.com%2Fb&extract_images=false"))
        .unwrap();

    let (status, body) = send(app(full), request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Chuyển đổi URL thành công: https://example.com/b");
}

#[tokio::test]
async fn convert_url_urlencoded_flags_use_form_boolean_rules() {
    let full = Arc::new(MockConverter::with_pages(1));
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "url=https%3A%2F%2Fexample.com%2Fe&extract_images=True&extract_tables=0",
        ))
        .unwrap();

    let (status, body) = send(app(full.clone()), request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let options = full.seen_options();
    assert_eq!(options.len(), 1);
    assert!(options[0].extract_images);
    assert!(!options[0].extract_tables);
}

#[tokio::test]
async fn convert_url_urlencoded_rejects_non_boolean_flag() {
    let full = Arc::new(MockConverter::with_pages(1));
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("url=https%3A%2F%2Fexample.com%2Ff&extract_tables=maybe"))
        .unwrap();

    let (status, _) = send(app(full.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(full.calls(), 0);
}

#[tokio::test]
async fn convert_url_json_flags_stay_plain_booleans() {
    let full = Arc::new(MockConverter::with_pages(1));
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"url":"https://example.com/g","extract_images":false,"extract_tables":true}"#,
        ))
        .unwrap();

    let (status, body) = send(app(full.clone()), request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let options = full.seen_options();
    assert!(!options[0].extract_images);
    assert!(options[0].extract_tables);
}

#[tokio::test]
async fn convert_url_accepts_multipart() {
    let full = Arc::new(MockConverter::with_pages(1));
    let body = multipart(None, &[("url", "https://example.com/c")]);
    let (status, body) = send(app(full), post_multipart("/convert-url", body)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file_type"], "url");
}

#[tokio::test]
async fn convert_url_without_url_is_400() {
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"extract_images":true}"#))
        .unwrap();

    let (status, _) = send(app(Arc::new(MockConverter::with_pages(1))), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn convert_url_throttled_once_still_succeeds() {
    let full = Arc::new(MockConverter::throttled(1, 1));
    let request = Request::post("/convert-url")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"url":"https://example.com/d"}"#))
        .unwrap();

    let (status, _) = send(app(full.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(full.calls(), 2);
}
