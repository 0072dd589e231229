use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

const PREVIEW_CHARS: usize = 120;
const MAX_HTML_BYTES: usize = 100 * 1024;
const MAX_CSS_BYTES: usize = 50 * 1024;

pub(crate) fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in text pattern is valid"))
}

fn script_or_style() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>")
}

fn block_break() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?i)<(br|/p|/div|/h[1-6]|/tr|/li|/td)\b[^>]*>")
}

fn any_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?s)<[^>]*>")
}

fn whitespace() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"\s+")
}

fn title() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?is)<title\b[^>]*>(.*?)</title\s*>")
}

fn style_block() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?is)<style\b[^>]*>(.*?)</style\s*>")
}

pub(crate) fn img_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?is)<img\b[^>]*>")
}

pub(crate) fn alt_attribute() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?i)\balt\s*=")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Readable plain-text rendition used for the text/plain MIME part.
pub fn plain_text(html: &str) -> String {
    let without_blocks = script_or_style().replace_all(html, " ");
    let with_breaks = block_break().replace_all(&without_blocks, " ");
    let without_tags = any_tag().replace_all(&with_breaks, " ");
    let decoded = decode_entities(&without_tags);
    whitespace().replace_all(&decoded, " ").trim().to_string()
}

/// Inbox preview line, cut on a char boundary.
pub fn preview_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub fn extract_subject(html: &str) -> Option<String> {
    title()
        .captures(html)
        .map(|captures| decode_entities(captures[1].trim()))
        .map(|subject| whitespace().replace_all(&subject, " ").to_string())
        .filter(|subject| !subject.is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LintIssue {
    MissingDoctype,
    MissingHtmlTag,
    MissingCharset,
    MissingViewport,
    ImagesWithoutAlt,
    HtmlTooLarge,
    CssTooLarge,
}

impl LintIssue {
    fn penalty(self) -> u8 {
        match self {
            Self::MissingDoctype | Self::MissingHtmlTag => 20,
            Self::MissingCharset | Self::MissingViewport => 10,
            Self::ImagesWithoutAlt => 10,
            Self::HtmlTooLarge | Self::CssTooLarge => 15,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub issues: Vec<LintIssue>,
    pub images_without_alt: usize,
    pub html_bytes: usize,
    pub css_bytes: usize,
    pub score: u8,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Email-client readiness checks on a finished document.
pub fn lint(html: &str) -> LintReport {
    let lowered = html.to_ascii_lowercase();
    let css_bytes: usize =
        style_block().captures_iter(html).map(|captures| captures[1].len()).sum();
    let images_without_alt = img_tag()
        .find_iter(html)
        .filter(|tag| !alt_attribute().is_match(tag.as_str()))
        .count();

    let mut issues = Vec::new();
    if !lowered.trim_start().starts_with("<!doctype") {
        issues.push(LintIssue::MissingDoctype);
    }
    if !lowered.contains("<html") {
        issues.push(LintIssue::MissingHtmlTag);
    }
    if !lowered.contains("charset") {
        issues.push(LintIssue::MissingCharset);
    }
    if !lowered.contains("name=\"viewport\"") && !lowered.contains("name='viewport'") {
        issues.push(LintIssue::MissingViewport);
    }
    if images_without_alt > 0 {
        issues.push(LintIssue::ImagesWithoutAlt);
    }
    if html.len() > MAX_HTML_BYTES {
        issues.push(LintIssue::HtmlTooLarge);
    }
    if css_bytes > MAX_CSS_BYTES {
        issues.push(LintIssue::CssTooLarge);
    }

    let penalty: u8 = issues.iter().map(|issue| issue.penalty()).sum();
    LintReport {
        issues,
        images_without_alt,
        html_bytes: html.len(),
        css_bytes,
        score: 100u8.saturating_sub(penalty),
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_subject, lint, plain_text, preview_text, LintIssue};

    #[test]
    fn plain_text_drops_head_and_markup() {
        let html = "<!DOCTYPE html><html><head><title>Hi</title><style>p{color:red}</style></head><body><h1>Welcome&nbsp;in</h1><p>Fresh bread &amp; coffee</p></body></html>";
        assert_eq!(plain_text(html), "Welcome in Fresh bread & coffee");
    }

    #[test]
    fn preview_is_cut_on_char_boundary() {
        let long = "pão ".repeat(60);
        let preview = preview_text(&long);
        assert!(preview.ends_with("..."));
        assert!(preview.chars().count() <= 123);
        assert_eq!(preview_text("  short  "), "short");
    }

    #[test]
    fn subject_comes_from_title() {
        assert_eq!(
            extract_subject("<head><title>\n  Spring &amp; Summer\n</title></head>").as_deref(),
            Some("Spring & Summer")
        );
        assert_eq!(extract_subject("<title>  </title>"), None);
    }

    #[test]
    fn lint_flags_missing_metadata_and_alt() {
        let report = lint("<html><body><img src=\"a.png\"><img src=\"b.png\" alt=\"\"></body></html>");
        assert_eq!(
            report.issues,
            vec![
                LintIssue::MissingDoctype,
                LintIssue::MissingCharset,
                LintIssue::MissingViewport,
                LintIssue::ImagesWithoutAlt
            ]
        );
        assert_eq!(report.images_without_alt, 1);
        assert_eq!(report.score, 50);
    }

    #[test]
    fn lint_passes_complete_document() {
        let report = lint("<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><meta content=\"width=device-width\" name=\"viewport\"></head><body></body></html>");
        assert!(report.is_clean());
        assert_eq!(report.score, 100);
    }
}
