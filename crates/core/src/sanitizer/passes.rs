//! Text-level cleanup passes that run before the DOM is built.

use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Hosts models reach for when they have no real asset URL.
pub const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "placeholder.com",
    "placehold.co",
    "placehold.it",
    "dummyimage.com",
    "picsum.photos",
    "placekitten.com",
    "source.unsplash.com",
];

/// Template slots the model forgot to fill. These mark a placeholder on any source.
const TEMPLATE_TOKENS: &[&str] = &["{{", "}}", "[image", "%image"];

/// Filename hints that only mark a placeholder on a relative or bare source.
const PLACEHOLDER_HINTS: &[&str] = &["image_url", "your-image", "your_image", "placeholder"];

/// Elements whose edges make surrounding whitespace insignificant.
const BLOCK_ELEMENTS: &[&str] = &[
    "html", "head", "body", "title", "meta", "link", "style", "script", "table", "thead", "tbody",
    "tfoot", "tr", "td", "th", "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li",
    "center", "section", "header", "footer", "main", "article", "nav", "br", "hr",
];

/// Parents under which a bare text run is narration rather than email copy.
const NARRATION_PARENTS: &[&str] = &["html", "body", "head", "table", "thead", "tbody", "tr"];

const VOID_ELEMENTS: &[&str] =
    &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in sanitizer pattern is valid"))
}

fn document_start() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?i)<(?:!doctype|html|head|body)[\s>]")
}

fn any_tag_start() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"<[A-Za-z!]")
}

fn img_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r#"(?is)<img\b[^>]*>"#)
}

fn src_attribute() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r#"(?is)(\bsrc\s*=\s*)(["'])(.*?)(["'])"#)
}

fn fence_marker() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"```[A-Za-z]*")
}

fn inter_tag_whitespace() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r">\s+<")
}

fn markup_token() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?s)<!--.*?-->|<[A-Za-z/!][^>]*>")
}

fn tag_name() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"^<\s*(/?)\s*([A-Za-z][A-Za-z0-9]*)")
}

fn emoji() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(
        &CELL,
        r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{231A}\x{231B}\x{23E9}-\x{23FA}\x{203C}\x{2049}\x{2194}-\x{21AA}\x{25AA}-\x{25FE}\x{2934}\x{2935}\x{3030}\x{303D}\x{3297}\x{3299}\x{FE0F}\x{200D}\x{20E3}\x{E0020}-\x{E007F}]",
    )
}

fn placeholder_url() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(
        &CELL,
        r#"(?i)(?:https?:)?//(?:[a-z0-9-]+\.)*(?:example\.(?:com|org|net)|placeholder\.com|placehold\.(?:co|it)|dummyimage\.com|picsum\.photos|placekitten\.com|source\.unsplash\.com)(?:[/?#][^\s"'<>)]*)?"#,
    )
}

fn placeholder_host() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(
        &CELL,
        r"(?i)\b(?:[a-z0-9-]+\.)*(?:example\.(?:com|org|net)|placeholder\.com|placehold\.(?:co|it)|dummyimage\.com|picsum\.photos|placekitten\.com|source\.unsplash\.com)\b",
    )
}

fn narration_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bhtml\s+(?:generated|created|updated)\s+successfully[.!]?",
            r"(?i)\bhtml\s+(?:gerado|criado|atualizado)\s+com\s+sucesso[.!]?",
            r"(?i)\bhere(?:\s+is|\s+are|'s)\s+(?:the|your)\s+(?:(?:updated|modified|revised|improved|new|complete|final)\s+)?(?:html|email\s+html|html\s+email|document|code|version)\b[^<]{0,120}?[:.]",
            r"(?i)\bi(?:'ve|\s+have)\s+(?:updated|modified|changed|created|made)\b[^<]{0,200}?[.!]",
            r"(?i)\blet\s+me\s+know\s+if\b[^<]{0,200}?[.!?]",
            r"(?i)\baqui\s+est[áa]\s+o\s+(?:html|email|c[óo]digo)\b[^<]{0,120}?[:.]",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Filename hints such as `placeholder` only count on relative sources; a
/// real upload may well be called `placeholder-banner.png`.
pub fn is_placeholder_url(src: &str) -> bool {
    let lowered = src.trim().to_ascii_lowercase();
    if lowered.is_empty() || lowered == "#" {
        return true;
    }
    if TEMPLATE_TOKENS.iter().any(|token| lowered.contains(token)) {
        return true;
    }
    if PLACEHOLDER_HOSTS.iter().any(|host| {
        lowered.contains(&format!("//{host}"))
            || lowered.contains(&format!(".{host}"))
            || lowered.starts_with(host)
    }) {
        return true;
    }
    let remote = ["http://", "https://", "//"].iter().any(|scheme| lowered.starts_with(scheme));
    !remote && PLACEHOLDER_HINTS.iter().any(|hint| lowered.contains(hint))
}

fn element_name(tag: &str) -> Option<(bool, String)> {
    tag_name()
        .captures(tag)
        .map(|caps| (!caps[1].is_empty(), caps[2].to_ascii_lowercase()))
}

fn img_src(tag: &str) -> Option<String> {
    src_attribute().captures(tag).map(|caps| caps[3].trim().to_string())
}

pub fn contains_emoji(text: &str) -> bool {
    emoji().is_match(text)
}

/// Pass 1. Returns `None` when the text carries no markup at all.
pub fn extract_boundaries(raw: &str) -> Option<String> {
    let start = document_start()
        .find(raw)
        .or_else(|| any_tag_start().find(raw))
        .map(|found| found.start())?;
    let tail = &raw[start..];
    let lowered = tail.to_ascii_lowercase();

    let end = lowered
        .rfind("</html>")
        .map(|index| index + "</html>".len())
        .or_else(|| lowered.rfind("</body>").map(|index| index + "</body>".len()))
        .unwrap_or(tail.len());

    Some(tail[..end].trim().to_string())
}

/// Pass 2. Only bare text runs sitting directly under the document
/// skeleton are inspected; copy inside content elements is never touched.
pub fn strip_narration(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut open: Vec<String> = Vec::new();
    let mut cursor = 0;

    for token in markup_token().find_iter(html) {
        push_text_run(&mut output, &html[cursor..token.start()], &open);
        output.push_str(token.as_str());
        track_open_elements(&mut open, token.as_str());
        cursor = token.end();
    }
    push_text_run(&mut output, &html[cursor..], &open);
    output
}

fn push_text_run(output: &mut String, text: &str, open: &[String]) {
    let bare = open.last().map_or(true, |parent| NARRATION_PARENTS.contains(&parent.as_str()));
    if bare && !text.trim().is_empty() {
        let cleaned = narration_patterns()
            .iter()
            .fold(text.to_string(), |acc, pattern| pattern.replace_all(&acc, "").into_owned());
        output.push_str(&cleaned);
    } else {
        output.push_str(text);
    }
}

fn track_open_elements(open: &mut Vec<String>, tag: &str) {
    let Some((closing, name)) = element_name(tag) else {
        return;
    };
    if closing {
        if let Some(index) = open.iter().rposition(|candidate| *candidate == name) {
            open.truncate(index);
        }
    } else if !VOID_ELEMENTS.contains(&name.as_str()) && !tag.trim_end_matches('>').ends_with('/') {
        open.push(name);
    }
}

/// Pass 3.
pub fn normalize_escapes(html: &str) -> String {
    let unescaped = html
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", " ")
        .replace("\\\"", "\"")
        .replace("\\/", "/");
    let unfenced = fence_marker().replace_all(&unescaped, "");
    collapse_inter_tag_whitespace(&unfenced).trim().to_string()
}

/// Whitespace next to a block edge is dropped; between two inline elements
/// it is significant and collapses to one space.
fn collapse_inter_tag_whitespace(html: &str) -> String {
    inter_tag_whitespace()
        .replace_all(html, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or(0..0, |found| found.range());
            let before = html[..whole.start + 1].rfind('<').map(|start| &html[start..whole.start + 1]);
            let after = &html[whole.end - 1..];
            let block_edge = [before, Some(after)].into_iter().any(|tag| {
                tag.and_then(element_name)
                    .map_or(true, |(_, name)| BLOCK_ELEMENTS.contains(&name.as_str()))
            });
            if block_edge {
                "><".to_string()
            } else {
                "> <".to_string()
            }
        })
        .into_owned()
}

/// Pass 4.
pub fn strip_emoji(html: &str) -> String {
    emoji().replace_all(html, "").into_owned()
}

/// Pass 5. Placeholder `<img>` sources are filled, in document order, with
/// the supplied URLs the document does not reference yet.
pub fn substitute_placeholder_images(html: &str, include_urls: &[&str]) -> (String, usize) {
    let mut pending: VecDeque<&str> =
        include_urls.iter().copied().filter(|url| !html.contains(url)).collect();
    if pending.is_empty() {
        return (html.to_string(), 0);
    }

    let mut substituted = 0;
    let output = img_tag().replace_all(html, |tag: &Captures<'_>| {
        let tag = &tag[0];
        let Some(src) = img_src(tag) else {
            return tag.to_string();
        };
        if include_urls.contains(&src.as_str()) || !is_placeholder_url(&src) {
            return tag.to_string();
        }
        let Some(url) = pending.pop_front() else {
            return tag.to_string();
        };
        substituted += 1;
        src_attribute()
            .replacen(tag, 1, |caps: &Captures<'_>| format!("{}{}{url}{}", &caps[1], &caps[2], &caps[4]))
            .into_owned()
    });
    (output.into_owned(), substituted)
}

/// Drops `<img>` tags whose source is an analyze-only reference image.
pub fn strip_analyze_images(html: &str, analyze_urls: &[&str]) -> (String, usize) {
    if analyze_urls.is_empty() {
        return (html.to_string(), 0);
    }
    let mut removed = 0;
    let output = img_tag().replace_all(html, |tag: &Captures<'_>| {
        match img_src(&tag[0]) {
            Some(src) if analyze_urls.contains(&src.as_str()) => {
                removed += 1;
                String::new()
            }
            _ => tag[0].to_string(),
        }
    });
    (output.into_owned(), removed)
}

/// Pass 6. Drops unresolved placeholder images, then neutralises any
/// remaining placeholder URL or bare host. Supplied URLs in `keep` survive
/// verbatim even when they look like placeholders.
pub fn strip_example_domains(html: &str, keep: &[&str]) -> (String, usize) {
    let mut removed = 0;
    let without_images = img_tag().replace_all(html, |tag: &Captures<'_>| {
        let placeholder = match img_src(&tag[0]) {
            Some(src) => !keep.contains(&src.as_str()) && is_placeholder_url(&src),
            None => true,
        };
        if placeholder {
            removed += 1;
            String::new()
        } else {
            tag[0].to_string()
        }
    });

    let mut shielded = without_images.into_owned();
    let kept: Vec<(String, &str)> = keep
        .iter()
        .filter(|url| !url.is_empty())
        .enumerate()
        .map(|(index, url)| (format!("\u{0}keep{index}\u{0}"), *url))
        .collect();
    for (marker, url) in &kept {
        shielded = shielded.replace(url, marker);
    }

    let without_urls = placeholder_url().replace_all(&shielded, "#");
    let mut cleaned = placeholder_host().replace_all(&without_urls, "").into_owned();
    for (marker, url) in &kept {
        cleaned = cleaned.replace(marker.as_str(), url);
    }
    (cleaned, removed)
}
