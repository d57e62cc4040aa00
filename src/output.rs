//! Response types and the result normalizer.

use serde::{Deserialize, Serialize};

/// One page as produced by a conversion capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// 1-based page number as reported upstream.
    pub page_number: usize,
    pub content: String,
}

impl RawPage {
    pub fn new(page_number: usize, content: impl Into<String>) -> Self {
        Self {
            page_number,
            content: content.into(),
        }
    }
}

/// One page of a [`ConversionResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub page_number: usize,
    pub content: String,
    /// Number of characters (not bytes) in `content`.
    pub content_length: usize,
}

/// Uniform paginated result returned by every conversion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub success: bool,
    pub message: String,
    pub pages: Vec<PageResult>,
    pub total_pages: usize,
    pub file_type: String,
}

/// Shape raw pages into a [`ConversionResponse`].
///
/// Pages keep the order the capability returned them in. `content_length`
/// is derived here and `total_pages` is always `pages.len()`.
pub fn normalize(
    raw_pages: Vec<RawPage>,
    file_type: impl Into<String>,
    message: impl Into<String>,
) -> ConversionResponse {
    let pages: Vec<PageResult> = raw_pages
        .into_iter()
        .map(|p| PageResult {
            page_number: p.page_number,
            content_length: p.content.chars().count(),
            content: p.content,
        })
        .collect();

    ConversionResponse {
        success: true,
        message: message.into(),
        total_pages: pages.len(),
        pages,
        file_type: file_type.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_length_and_total() {
        let resp = normalize(
            vec![RawPage::new(1, "| a | b |"), RawPage::new(2, "")],
            "csv",
            "ok",
        );
        assert!(resp.success);
        assert_eq!(resp.total_pages, 2);
        assert_eq!(resp.pages[0].content_length, 9);
        assert_eq!(resp.pages[1].content_length, 0);
        assert_eq!(resp.file_type, "csv");
    }

    #[test]
    fn length_counts_characters() {
        let resp = normalize(vec![RawPage::new(1, "\u{e9}t\u{e9}")], "pdf", "");
        assert_eq!(resp.pages[0].content.len(), 5);
        assert_eq!(resp.pages[0].content_length, 3);
    }

    #[test]
    fn keeps_upstream_order() {
        let resp = normalize(
            vec![RawPage::new(2, "b"), RawPage::new(1, "a")],
            "pdf",
            "",
        );
        let numbers: Vec<_> = resp.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![2, 1]);
    }

    #[test]
    fn empty_input() {
        let resp = normalize(Vec::new(), "url", "done");
        assert_eq!(resp.total_pages, 0);
        assert!(resp.pages.is_empty());
    }

    #[test]
    fn serializes_expected_fields() {
        let resp = normalize(vec![RawPage::new(1, "x")], "png", "m");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["pages"][0]["content_length"], 1);
        assert_eq!(json["total_pages"], 1);
        assert_eq!(json["file_type"], "png");
    }
}
