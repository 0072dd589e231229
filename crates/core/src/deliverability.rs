//! Inbox placement heuristics for a finished document and its subject line.
//!
//! Three independent checks: a spam signal tally, a deliverability score
//! and an accessibility score. Both scores start at 100 and only go down.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::text::{alt_attribute, cached, img_tag, plain_text};

const SUBJECT_TRIGGERS: &[&str] = &[
    "grátis", "free", "urgent", "urgente", "promoção", "desconto", "oferta", "limitado", "agora",
    "clique aqui",
];

const SUBJECT_SPAM_PHRASES: &[&str] = &[
    "free", "grátis", "urgent", "urgente", "guaranteed", "garantido", "act now", "agora",
    "limited time", "tempo limitado", "click here", "clique aqui", "buy now", "compre agora",
];

const CONTENT_SPAM_PHRASES: &[&str] =
    &["viagra", "casino", "lottery", "million", "millionaire", "inheritance", "nigerian", "prince", "diplomat"];

const URL_SHORTENERS: &[&str] = &["bit.ly", "tinyurl.com", "t.co"];

const GENERIC_LINK_TEXT: &[&str] = &["click here", "clique aqui", "here", "aqui"];

const MAX_SUBJECT_CHARS: usize = 50;
const MAX_EXTERNAL_LINKS: usize = 10;
const MAX_IMAGES: usize = 5;
const MAX_EXCLAMATIONS: usize = 5;

fn href() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r#"(?i)\bhref\s*=\s*["']([^"']+)["']"#)
}

fn heading() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?i)<h([1-6])\b")
}

fn anchor_text() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?is)<a\b[^>]*>(.*?)</a\s*>")
}

fn table_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?i)<table\b[^>]*>")
}

fn role_attribute() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"(?i)\brole\s*=")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamRisk {
    VeryLow,
    Low,
    Medium,
    High,
}

impl SpamRisk {
    fn from_score(score: u32) -> Self {
        match score {
            8.. => Self::High,
            4..=7 => Self::Medium,
            1..=3 => Self::Low,
            0 => Self::VeryLow,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamSignal {
    SubjectPhrase,
    ShoutingSubject,
    ContentPhrase,
    ExcessiveExclamation,
    UrlShortener,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpamFactor {
    pub signal: SpamSignal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<&'static str>,
    pub points: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpamCheck {
    pub score: u32,
    pub risk: SpamRisk,
    pub factors: Vec<SpamFactor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverabilityFinding {
    SpammySubject,
    LongSubject,
    NoText,
    LowTextRatio,
    TooManyLinks,
    TooManyImages,
    ImagesWithoutAlt,
}

impl DeliverabilityFinding {
    fn penalty(self) -> u8 {
        match self {
            Self::NoText => 30,
            Self::SpammySubject => 20,
            Self::LowTextRatio => 15,
            Self::LongSubject | Self::TooManyLinks | Self::ImagesWithoutAlt => 10,
            Self::TooManyImages => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliverabilityCheck {
    pub score: u8,
    pub findings: Vec<DeliverabilityFinding>,
    pub text_chars: usize,
    pub external_links: usize,
    pub images: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessibilityFinding {
    ImagesWithoutAlt,
    NoHeadings,
    FirstHeadingNotH1,
    GenericLinkText,
    TablesWithoutRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessibilityCheck {
    pub score: u8,
    pub findings: Vec<AccessibilityFinding>,
    pub images_without_alt: usize,
    pub generic_links: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliverabilityReport {
    pub spam: SpamCheck,
    pub deliverability: DeliverabilityCheck,
    pub accessibility: AccessibilityCheck,
}

pub fn assess(html: &str, subject: &str) -> DeliverabilityReport {
    DeliverabilityReport {
        spam: spam_check(html, subject),
        deliverability: deliverability_check(html, subject),
        accessibility: accessibility_check(html),
    }
}

fn images_without_alt(html: &str) -> usize {
    img_tag().find_iter(html).filter(|tag| !alt_attribute().is_match(tag.as_str())).count()
}

pub fn spam_check(html: &str, subject: &str) -> SpamCheck {
    let mut factors = Vec::new();
    let subject_lower = subject.to_lowercase();
    let content_lower = html.to_lowercase();

    for phrase in SUBJECT_SPAM_PHRASES.iter().filter(|phrase| subject_lower.contains(*phrase)) {
        factors.push(SpamFactor { signal: SpamSignal::SubjectPhrase, term: Some(*phrase), points: 1 });
    }

    let total = subject.chars().count();
    let upper = subject.chars().filter(|ch| ch.is_uppercase()).count();
    if total > 0 && upper * 2 > total {
        factors.push(SpamFactor { signal: SpamSignal::ShoutingSubject, term: None, points: 2 });
    }

    for phrase in CONTENT_SPAM_PHRASES.iter().filter(|phrase| content_lower.contains(*phrase)) {
        factors.push(SpamFactor { signal: SpamSignal::ContentPhrase, term: Some(*phrase), points: 3 });
    }

    if html.matches('!').count() > MAX_EXCLAMATIONS {
        factors.push(SpamFactor { signal: SpamSignal::ExcessiveExclamation, term: None, points: 1 });
    }

    for shortener in URL_SHORTENERS.iter().filter(|host| content_lower.contains(*host)) {
        factors.push(SpamFactor { signal: SpamSignal::UrlShortener, term: Some(*shortener), points: 2 });
    }

    let score = factors.iter().map(|factor| factor.points).sum();
    SpamCheck { score, risk: SpamRisk::from_score(score), factors }
}

pub fn deliverability_check(html: &str, subject: &str) -> DeliverabilityCheck {
    let subject_lower = subject.to_lowercase();
    let text_chars = plain_text(html).chars().count();
    let external_links = href()
        .captures_iter(html)
        .filter(|caps| {
            let target = caps[1].trim_start().to_ascii_lowercase();
            target.starts_with("http://") || target.starts_with("https://")
        })
        .count();
    let images = img_tag().find_iter(html).count();

    let mut findings = Vec::new();
    if SUBJECT_TRIGGERS.iter().filter(|trigger| subject_lower.contains(*trigger)).count() > 2 {
        findings.push(DeliverabilityFinding::SpammySubject);
    }
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        findings.push(DeliverabilityFinding::LongSubject);
    }
    if text_chars == 0 {
        findings.push(DeliverabilityFinding::NoText);
    } else if text_chars * 10 < html.chars().count() {
        findings.push(DeliverabilityFinding::LowTextRatio);
    }
    if external_links > MAX_EXTERNAL_LINKS {
        findings.push(DeliverabilityFinding::TooManyLinks);
    }
    if images > MAX_IMAGES {
        findings.push(DeliverabilityFinding::TooManyImages);
    }
    if images_without_alt(html) > 0 {
        findings.push(DeliverabilityFinding::ImagesWithoutAlt);
    }

    let penalty: u8 = findings.iter().map(|finding| finding.penalty()).fold(0, u8::saturating_add);
    DeliverabilityCheck {
        score: 100u8.saturating_sub(penalty),
        findings,
        text_chars,
        external_links,
        images,
    }
}

/// Colour contrast is not scored: a keyword match on `#fff`/`#000` says
/// nothing about the pairs actually rendered.
pub fn accessibility_check(html: &str) -> AccessibilityCheck {
    let mut findings = Vec::new();
    let mut penalty: u8 = 0;

    let missing_alt = images_without_alt(html);
    if missing_alt > 0 {
        findings.push(AccessibilityFinding::ImagesWithoutAlt);
        let capped = missing_alt.saturating_mul(5).min(30);
        penalty = penalty.saturating_add(u8::try_from(capped).unwrap_or(30));
    }

    match heading().captures(html) {
        None => {
            findings.push(AccessibilityFinding::NoHeadings);
            penalty = penalty.saturating_add(10);
        }
        Some(first) if &first[1] != "1" => {
            findings.push(AccessibilityFinding::FirstHeadingNotH1);
            penalty = penalty.saturating_add(5);
        }
        Some(_) => {}
    }

    let generic_links = anchor_text()
        .captures_iter(html)
        .filter(|caps| {
            let label = plain_text(&caps[1]).to_lowercase();
            GENERIC_LINK_TEXT.contains(&label.as_str())
        })
        .count();
    if generic_links > 0 {
        findings.push(AccessibilityFinding::GenericLinkText);
        penalty = penalty.saturating_add(10);
    }

    if table_tag().find_iter(html).any(|tag| !role_attribute().is_match(tag.as_str())) {
        findings.push(AccessibilityFinding::TablesWithoutRole);
        penalty = penalty.saturating_add(5);
    }

    AccessibilityCheck {
        score: 100u8.saturating_sub(penalty),
        findings,
        images_without_alt: missing_alt,
        generic_links,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        accessibility_check, assess, deliverability_check, spam_check, AccessibilityFinding,
        DeliverabilityFinding, SpamRisk, SpamSignal,
    };

    const CLEAN: &str = r#"<!DOCTYPE html><html><head><title>Spring menu</title></head><body><table role="presentation"><tr><td><h1>Spring menu</h1><p>Our seasonal pies are back this week, baked fresh every morning with local fruit.</p><a href="https://bakery.test/menu">See the full menu</a></td></tr></table></body></html>"#;

    #[test]
    fn a_plain_newsletter_scores_clean() {
        let report = assess(CLEAN, "Spring menu");
        assert_eq!(report.spam.score, 0);
        assert_eq!(report.spam.risk, SpamRisk::VeryLow);
        assert_eq!(report.deliverability.score, 100);
        assert!(report.deliverability.findings.is_empty());
        assert_eq!(report.accessibility.score, 100);
        assert!(report.accessibility.findings.is_empty());
    }

    #[test]
    fn spam_signals_add_up_to_a_risk_band() {
        let html = "<p>You won the lottery! A prince left a million! Claim at bit.ly/x !!!!</p>";
        let check = spam_check(html, "FREE URGENT OFFER");

        let signals: Vec<SpamSignal> = check.factors.iter().map(|factor| factor.signal).collect();
        assert!(signals.contains(&SpamSignal::SubjectPhrase));
        assert!(signals.contains(&SpamSignal::ShoutingSubject));
        assert!(signals.contains(&SpamSignal::ExcessiveExclamation));
        assert!(check.factors.iter().any(|factor| factor.term == Some("bit.ly")));
        assert!(check.score >= 8);
        assert_eq!(check.risk, SpamRisk::High);
    }

    #[test]
    fn risk_bands_follow_the_score() {
        assert_eq!(spam_check("<p>hi</p>", "Free").risk, SpamRisk::Low);
        assert_eq!(spam_check("<p>casino</p>", "Free").risk, SpamRisk::Medium);
    }

    #[test]
    fn deliverability_penalises_subject_and_layout() {
        let images: String =
            (0..6).map(|index| format!(r#"<img src="https://cdn.test/{index}.png">"#)).collect();
        let html = format!("<html><body>{images}</body></html>");
        let check = deliverability_check(&html, "Promoção grátis com desconto agora, só hoje para você!");

        assert_eq!(
            check.findings,
            vec![
                DeliverabilityFinding::SpammySubject,
                DeliverabilityFinding::LongSubject,
                DeliverabilityFinding::NoText,
                DeliverabilityFinding::TooManyImages,
                DeliverabilityFinding::ImagesWithoutAlt,
            ]
        );
        assert_eq!(check.score, 25);
        assert_eq!(check.images, 6);
    }

    #[test]
    fn markup_heavy_documents_have_a_low_text_ratio() {
        let css = "p{color:#111}".repeat(40);
        let styled = format!("<html><head><style>{css}</style></head><body><p>Hi</p></body></html>");
        let check = deliverability_check(&styled, "Hello");
        assert_eq!(check.findings, vec![DeliverabilityFinding::LowTextRatio]);
        assert_eq!(check.score, 85);
    }

    #[test]
    fn accessibility_flags_structure_and_link_text() {
        let html = r#"<table><tr><td><h2>Menu</h2><img src="a.png"><img src="b.png"><a href="https://x.test"> Click here </a></td></tr></table>"#;
        let check = accessibility_check(html);

        assert_eq!(
            check.findings,
            vec![
                AccessibilityFinding::ImagesWithoutAlt,
                AccessibilityFinding::FirstHeadingNotH1,
                AccessibilityFinding::GenericLinkText,
                AccessibilityFinding::TablesWithoutRole,
            ]
        );
        assert_eq!(check.score, 100 - 10 - 5 - 10 - 5);
        assert_eq!(check.images_without_alt, 2);
    }

    #[test]
    fn missing_alt_penalty_is_capped() {
        let images = r#"<img src="x.png">"#.repeat(12);
        let check = accessibility_check(&format!("<h1>T</h1>{images}"));
        assert_eq!(check.score, 70);
    }
}
