//! Turns raw model output into one persistable, email-safe HTML document.
//!
//! Passes run in a fixed order and each consumes the previous pass's output:
//!
//! 1. boundary extraction
//! 2. narration stripping
//! 3. escape and whitespace normalization
//! 4. emoji stripping
//! 5. placeholder image substitution
//! 6. analyze-image and example-domain stripping
//! 7. structural DOM augmentation
//! 8. CSS inlining
//!
//! Passes 7 and 8 parse a DOM. When either fails the pre-pass html is kept
//! and the failure is recorded in [`SanitizeReport::degraded_passes`].

pub mod css;
pub mod dom;
pub mod passes;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::instruction::{ImageIntent, ImageReference};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    pub found_markup: bool,
    pub substituted_images: usize,
    pub stripped_placeholders: usize,
    pub dropped_analyze_images: usize,
    pub filled_gaps: Vec<&'static str>,
    pub inlined_elements: usize,
    pub degraded_passes: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SanitizedHtml {
    pub html: String,
    pub report: SanitizeReport,
}

impl SanitizedHtml {
    /// False when the model returned prose only; callers treat that as a
    /// failed completion.
    pub fn is_document(&self) -> bool {
        self.report.found_markup && !self.html.trim().is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseSanitizer;

impl ResponseSanitizer {
    pub fn sanitize(&self, raw: &str, images: &[ImageReference]) -> SanitizedHtml {
        let mut report = SanitizeReport::default();

        let Some(extracted) = passes::extract_boundaries(raw) else {
            debug!(event_name = "sanitizer.no_markup", raw_len = raw.len(), "model output had no markup");
            return SanitizedHtml { html: String::new(), report };
        };
        report.found_markup = true;

        let html = passes::strip_narration(&extracted);
        let html = passes::normalize_escapes(&html);
        let html = passes::strip_emoji(&html);

        let urls_with = |intent: ImageIntent| -> Vec<&str> {
            images
                .iter()
                .filter(|image| image.intent == intent)
                .map(|image| image.url.as_str())
                .collect()
        };
        let include_urls = urls_with(ImageIntent::Include);
        let analyze_urls = urls_with(ImageIntent::Analyze);

        let (html, substituted) = passes::substitute_placeholder_images(&html, &include_urls);
        report.substituted_images = substituted;

        let (html, dropped) = passes::strip_analyze_images(&html, &analyze_urls);
        report.dropped_analyze_images = dropped;

        let (html, stripped) = passes::strip_example_domains(&html, &include_urls);
        report.stripped_placeholders = stripped;

        let html = match dom::augment(&html) {
            Ok((augmented, filled)) => {
                report.filled_gaps = filled;
                augmented
            }
            Err(error) => {
                warn!(event_name = "sanitizer.augment_failed", error = %error, "keeping pre-augment html");
                report.degraded_passes.push("augment");
                html
            }
        };

        let html = match dom::inline_styles(&html) {
            Ok((inlined, touched)) => {
                report.inlined_elements = touched;
                inlined
            }
            Err(error) => {
                warn!(event_name = "sanitizer.inline_failed", error = %error, "keeping pre-inline html");
                report.degraded_passes.push("inline_css");
                html
            }
        };

        debug!(
            event_name = "sanitizer.done",
            substituted = report.substituted_images,
            stripped = report.stripped_placeholders,
            dropped_analyze = report.dropped_analyze_images,
            inlined = report.inlined_elements,
            "sanitized model output"
        );
        SanitizedHtml { html, report }
    }
}

#[cfg(test)]
mod tests {
    use super::passes::contains_emoji;
    use super::ResponseSanitizer;
    use crate::domain::instruction::ImageReference;

    const NARRATED: &str = "Sure! Here is the updated HTML:\n```html\n<!DOCTYPE html>\n<html>\n<head>\n<title>Spring Sale</title>\n<style>.cta{background:#16a34a;color:#ffffff;padding:14px 28px}</style>\n</head>\n<body>\n<h1>Spring Sale \u{1F338}</h1>\nHTML generated successfully!\n<img src=\"https://via.placeholder.com/600x200\">\n<p>Visit https://example.com/deals for more.</p>\n<a class=\"cta\" href=\"https://shop.test/spring\">Buy Now</a>\n</body>\n</html>\n```\nLet me know if you want any other changes!";

    #[test]
    fn narrated_output_becomes_single_clean_document() {
        let sanitized = ResponseSanitizer.sanitize(NARRATED, &[]);
        let html = &sanitized.html;

        assert!(sanitized.is_document());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.ends_with("</html>"));
        assert_eq!(html.matches("<html").count(), 1);
        assert!(!html.contains("Sure!"));
        assert!(!html.contains("Let me know"));
        assert!(!html.contains("generated successfully"));
        assert!(!html.contains("```"));
        assert!(!html.contains("example.com"));
        assert!(!html.contains("placeholder"));
        assert!(!contains_emoji(html));
        assert!(html.contains("background: #16a34a"));
        assert_eq!(sanitized.report.stripped_placeholders, 1);
    }

    #[test]
    fn sanitizing_twice_is_a_fixed_point() {
        let inputs = [
            NARRATED,
            "Here you go: <html><body><p>Hi there</p><img src=\"https://cdn.test/a.png\"></body></html> Thanks!",
            "<div class=\\\"box\\\">\\n<p>escaped</p></div> trailing words",
        ];
        for input in inputs {
            let once = ResponseSanitizer.sanitize(input, &[]);
            let twice = ResponseSanitizer.sanitize(&once.html, &[]);
            assert_eq!(once.html, twice.html, "not idempotent for input: {input}");
        }
    }

    #[test]
    fn include_images_land_in_order() {
        let raw = "<html><body><img src=\"https://placehold.co/600x300\"><p>Text</p><img src=\"{{IMAGE_2}}\"></body></html>";
        let images = vec![
            ImageReference::analyze("https://cdn.test/reference.png"),
            ImageReference::include("https://cdn.test/hero.png"),
            ImageReference::include("https://cdn.test/product.png"),
        ];
        let sanitized = ResponseSanitizer.sanitize(raw, &images);

        let sources: Vec<&str> = sanitized
            .html
            .match_indices("src=\"")
            .map(|(index, _)| {
                let rest = &sanitized.html[index + 5..];
                &rest[..rest.find('"').unwrap_or(rest.len())]
            })
            .collect();
        assert_eq!(sources, vec!["https://cdn.test/hero.png", "https://cdn.test/product.png"]);
        assert!(!sanitized.html.contains("reference.png"));
        assert_eq!(sanitized.report.substituted_images, 2);
    }

    #[test]
    fn analyze_images_echoed_by_the_model_are_dropped() {
        let raw = r#"<html><body><img src="https://cdn.test/moodboard.png" alt="m"><img src="https://cdn.test/hero.png"></body></html>"#;
        let images = vec![
            ImageReference::analyze("https://cdn.test/moodboard.png"),
            ImageReference::include("https://cdn.test/hero.png"),
        ];
        let sanitized = ResponseSanitizer.sanitize(raw, &images);

        assert!(!sanitized.html.contains("moodboard.png"));
        assert!(sanitized.html.contains(r#"src="https://cdn.test/hero.png""#));
        assert_eq!(sanitized.report.dropped_analyze_images, 1);
    }

    #[test]
    fn include_urls_with_placeholder_words_are_kept() {
        let banner = "https://cdn.app.test/uploads/placeholder-banner.png";
        let raw = format!(r#"<html><body><img src="{banner}" alt="Banner"><p>Hi</p></body></html>"#);
        let sanitized = ResponseSanitizer.sanitize(&raw, &[ImageReference::include(banner)]);

        assert!(sanitized.html.contains(banner));
        assert_eq!(sanitized.report.stripped_placeholders, 0);
        assert_eq!(sanitized.report.substituted_images, 0);
    }

    #[test]
    fn inline_copy_keeps_its_spacing_and_narration_words() {
        let raw = "<html><body>\n<p><strong>Fresh</strong>\n  <em>bread</em></p>\n<p>I've updated our menu with seasonal pies.</p>\n</body></html>";
        let sanitized = ResponseSanitizer.sanitize(raw, &[]);

        assert!(sanitized.html.contains("<strong>Fresh</strong> <em>bread</em>"));
        assert!(sanitized.html.contains("I've updated our menu with seasonal pies."));
    }

    #[test]
    fn prose_only_output_is_not_a_document() {
        let sanitized = ResponseSanitizer.sanitize("I'm sorry, I can't help with that.", &[]);
        assert!(!sanitized.is_document());
        assert!(sanitized.html.is_empty());
    }
}
