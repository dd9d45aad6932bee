//! Post-processing: deterministic cleanup of model and OCR output.
//!
//! Two consumers, two entry points:
//!
//! - [`clean_ocr_text`] tidies recognised page text before it reaches the
//!   readability check and the interpreter. Vision models sometimes wrap a
//!   transcription in fences; tesseract leaves form feeds and long runs of
//!   blank lines between table blocks.
//! - [`json_payload`] isolates the JSON document inside an interpreter
//!   response, which may be fenced (```` ```json ````) or surrounded by a
//!   sentence of chatter despite the prompt.
//!
//! Every rule is a pure `&str → String` function so each is testable alone.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean recognised page text.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings and form feeds to LF
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, bidi marks)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 1
pub fn clean_ocr_text(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Return the JSON part of an interpreter response.
///
/// Strips outer fences, then narrows to the span from the first `{`/`[`
/// to the last matching closer. Returns the trimmed input unchanged when no
/// JSON-looking span exists, so the caller's parse error shows what came back.
pub fn json_payload(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = s.trim();
    let start = s.find(['{', '[']);
    let end = s.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if end > start => s[start..=end].to_string(),
        _ => s.to_string(),
    }
}

// ── Rule 1: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ──────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}'], "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{200E}',
            '\u{200F}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ───────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ──────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
