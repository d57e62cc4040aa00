//! Deterministic cleanup of model output.
//!
//! Even a well-prompted model sometimes wraps its answer in a ```` ```markdown ````
//! fence, emits `\r\n`, or leaves zero-width characters behind. These passes
//! fix such quirks without touching content. [`to_plain_text`] additionally
//! removes Markdown syntax for the `text` output type.
//!
//! Order matters: fences go first so the later passes see the real content,
//! and the final-newline pass runs last.

use crate::config::OutputType;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page of model output for the requested output type.
pub fn finish(input: &str, output_type: OutputType) -> String {
    let cleaned = clean_markdown(input);
    match output_type {
        OutputType::Markdown => cleaned,
        OutputType::Text => ensure_final_newline(&to_plain_text(&cleaned)),
    }
}

/// Rules, in order:
/// 1. Strip outer markdown fences
/// 2. CRLF / CR → LF
/// 3. Trim trailing whitespace per line
/// 4. Collapse runs of blank lines to at most two
/// 5. Replace placeholder image links with their alt text
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. Exactly one final newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_placeholder_images(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1 ───────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").expect("valid regex")
});

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rules 2-4 ────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 5 ───────────────────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("valid regex"));

/// A link the model could not have seen in the document: relative paths,
/// empty targets and the usual example domains.
fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if !u.starts_with("http://") && !u.starts_with("https://") {
        return true;
    }
    ["example.com", "placeholder.com", "dummyimage.com", "picsum.photos", "placehold.it"]
        .iter()
        .any(|d| u.contains(d))
}

fn remove_placeholder_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if !is_placeholder_url(&caps[2]) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{alt}*"),
            }
        })
        .into_owned()
}

// ── Rules 6-7 ────────────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

// ── Markdown → text ──────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("valid regex"));
static RE_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\*\*|__|\*|_)([^*_\n]+)(\*\*|__|\*|_)").expect("valid regex"));
static RE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static RE_FENCE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^```.*$\n?").expect("valid regex"));
static RE_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^>\s?").expect("valid regex"));
static RE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([-*_]\s*){3,}$\n?").expect("valid regex"));

/// Remove Markdown syntax, keeping the text.
///
/// Table rows become tab-separated lines and their separator rows are
/// dropped; list markers are kept since they carry meaning in plain text.
pub fn to_plain_text(markdown: &str) -> String {
    let s = RE_FENCE_LINE.replace_all(markdown, "");
    let s = RE_RULE.replace_all(&s, "");
    let s = RE_HEADING.replace_all(&s, "");
    let s = RE_QUOTE.replace_all(&s, "");
    let s = RE_LINK.replace_all(&s, "$1");
    let s = RE_INLINE_CODE.replace_all(&s, "$1");
    let s = RE_EMPHASIS.replace_all(&s, "$2");

    s.lines()
        .filter_map(|line| {
            if is_table_row(line) {
                if is_separator_row(line) {
                    return None;
                }
                let cells: Vec<&str> = line
                    .trim()
                    .trim_matches('|')
                    .split('|')
                    .map(str::trim)
                    .collect();
                return Some(cells.join("\t"));
            }
            Some(line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}
