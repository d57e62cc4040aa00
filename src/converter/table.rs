//! CSV capability: one page holding the whole table.
//!
//! Records are read with the `csv` crate in flexible mode, so ragged rows
//! are kept and padded when the GFM table is rendered. Rows of empty cells
//! are data and survive; only truly blank lines are skipped by the reader.

use crate::config::{ConversionOptions, OutputType};
use crate::error::CapabilityError;
use crate::output::RawPage;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Convert a staged CSV file into a single page.
pub async fn convert_csv(
    path: &Path,
    options: &ConversionOptions,
) -> Result<Vec<RawPage>, CapabilityError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CapabilityError::permanent(format!("Failed to read CSV file: {e}")))?;

    let rows = parse_csv(&bytes)?;
    if rows.is_empty() {
        return Err(CapabilityError::permanent("CSV file is empty"));
    }
    debug!("Parsed CSV: {} rows", rows.len());

    let content = match options.output_type {
        OutputType::Markdown => to_markdown_table(&rows),
        OutputType::Text => to_text(&rows),
    };
    Ok(vec![RawPage::new(1, content)])
}

/// Read every record. Invalid UTF-8 is replaced, not rejected.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, CapabilityError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    reader
        .byte_records()
        .map(|record| {
            record
                .map(|r| {
                    r.iter()
                        .map(|field| String::from_utf8_lossy(field).into_owned())
                        .collect::<Vec<String>>()
                })
                .map_err(|e| CapabilityError::permanent(format!("Malformed CSV: {e}")))
        })
        .collect()
}

/// Render rows as a GFM pipe table; the first row is the header.
pub fn to_markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = String::new();

    for (i, row) in rows.iter().enumerate() {
        out.push('|');
        for col in 0..width {
            let cell = row.get(col).map(String::as_str).unwrap_or("");
            out.push(' ');
            out.push_str(&escape_cell(cell));
            out.push_str(" |");
        }
        out.push('\n');
        if i == 0 {
            out.push('|');
            out.push_str(&" --- |".repeat(width));
            out.push('\n');
        }
    }
    out
}

/// Render rows as tab-separated lines.
pub fn to_text(rows: &[Vec<String>]) -> String {
    let mut out = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|f| f.trim().replace(['\n', '\t'], " "))
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    out
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}
