//! System prompts for the vision and text transcription calls.
//!
//! Every prompt the service sends lives here so wording changes stay in one
//! place and can be checked by unit tests without a model. The request's
//! [`ConversionOptions`] decide which rule blocks are included.

use crate::config::{ConversionOptions, OutputType};

/// Rules shared by every page transcription.
const BASE_RULES: &str = r#"You are an expert document converter. Convert the attached page image into clean, well-structured output.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL text content completely and accurately, in its original language
   - Maintain the reading order as a human would read the page
   - Correct obvious recognition errors only if you are completely certain

2. STRUCTURE
   - Use # for the main title (at most one per page), ## and ### for sections
   - Use - for unordered lists and 1. 2. 3. for ordered lists
   - Use **bold** and *italic* to match the visual emphasis"#;

const TABLE_RULES: &str = r#"

3. TABLES
   - Convert tables to GFM pipe format with a header separator row
   - If a table is too complex for pipe format, use HTML table markup"#;

const NO_TABLE_RULES: &str = r#"

3. TABLES
   - Transcribe table cells as plain lines of text, row by row"#;

const IMAGE_RULES: &str = r#"

4. FIGURES
   - Describe each chart, diagram or photo in one italic sentence, e.g. *Figure: revenue by quarter*
   - Never invent image links"#;

const NO_IMAGE_RULES: &str = r#"

4. FIGURES
   - Skip figures, charts and photos entirely; transcribe only their captions"#;

const MARKDOWN_OUTPUT: &str = r#"

5. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap in ```markdown fences
   - Do NOT add commentary, explanations or "Page X of Y" markers
   - Skip page numbers and repeated headers/footers"#;

const TEXT_OUTPUT: &str = r#"

5. OUTPUT FORMAT
   - Output plain text only, with no Markdown syntax
   - Separate paragraphs with one blank line
   - Do NOT add commentary, explanations or "Page X of Y" markers
   - Skip page numbers and repeated headers/footers"#;

/// System prompt for one page image (PDF page, office page or upload).
pub fn page_prompt(options: &ConversionOptions) -> String {
    let mut prompt = String::from(BASE_RULES);
    prompt.push_str(if options.extract_tables {
        TABLE_RULES
    } else {
        NO_TABLE_RULES
    });
    prompt.push_str(if options.extract_images {
        IMAGE_RULES
    } else {
        NO_IMAGE_RULES
    });
    prompt.push_str(match options.output_type {
        OutputType::Markdown => MARKDOWN_OUTPUT,
        OutputType::Text => TEXT_OUTPUT,
    });
    prompt
}

/// System prompt for rewriting the extracted text of a web page.
pub fn web_prompt(options: &ConversionOptions) -> String {
    let target = match options.output_type {
        OutputType::Markdown => "clean, well-structured Markdown",
        OutputType::Text => "clean plain text without any Markdown syntax",
    };
    let tables = if options.extract_tables {
        " Keep tabular data as GFM pipe tables."
    } else {
        ""
    };
    format!(
        "You are given the visible text of a web page, extracted from its HTML. \
         Rewrite it as {target}. Keep every piece of real content in its original \
         language and order. Drop navigation menus, cookie banners and footers.{tables} \
         Output only the converted content, with no commentary and no surrounding fences."
    )
}

/// User turn accompanying the extracted web text.
pub fn web_user_message(url: &str, text: &str) -> String {
    format!("Source: {url}\n\n\"\"\"\n{text}\n\"\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_has_tables_and_markdown() {
        let p = page_prompt(&ConversionOptions::default());
        assert!(p.contains("GFM pipe format"));
        assert!(p.contains("Output ONLY the Markdown"));
        assert!(p.contains("italic sentence"));
    }

    #[test]
    fn options_switch_rule_blocks() {
        let opts = ConversionOptions {
            extract_images: false,
            extract_tables: false,
            output_type: OutputType::Text,
        };
        let p = page_prompt(&opts);
        assert!(!p.contains("GFM pipe format"));
        assert!(p.contains("Skip figures"));
        assert!(p.contains("plain text only"));
    }

    #[test]
    fn web_prompt_follows_output_type() {
        let md = web_prompt(&ConversionOptions::default());
        assert!(md.contains("Markdown"));
        let text = web_prompt(&ConversionOptions {
            output_type: OutputType::Text,
            ..ConversionOptions::default()
        });
        assert!(text.contains("plain text"));
        assert!(text.contains("pipe tables"));
        assert!(web_user_message("https://a.b", "hi").starts_with("Source: https://a.b"));
    }
}
