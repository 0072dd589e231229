//! Deterministic email used when the model cannot produce a new document.

use tera::{Context, Tera};
use thiserror::Error;

use crate::palette::Industry;

const TEMPLATE_NAME: &str = "fallback_email.html";
const SUBJECT_MAX_CHARS: usize = 70;

const LEADING_VERBS: &[&str] = &[
    "create", "make", "write", "generate", "build", "design", "draft", "crie", "criar", "faça",
    "gere", "gerar", "escreva",
];
const LEADING_ARTICLES: &[&str] = &["a", "an", "the", "um", "uma", "o"];

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("fallback template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackEmail {
    pub subject: String,
    pub html: String,
}

#[derive(Debug)]
pub struct FallbackGenerator {
    tera: Tera,
}

impl FallbackGenerator {
    pub fn new() -> Result<Self, FallbackError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            TEMPLATE_NAME,
            include_str!("../../../templates/fallback_email.html"),
        )?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        instruction_text: &str,
        include_urls: &[&str],
    ) -> Result<FallbackEmail, FallbackError> {
        let industry = Industry::detect(instruction_text);
        let palette = industry.palette();
        let subject = subject_from_instruction(instruction_text);

        let mut context = Context::new();
        context.insert("subject", &subject);
        context.insert("body_text", instruction_text.trim());
        context.insert("cta_label", palette.cta_label);
        context.insert("primary", palette.primary);
        context.insert("secondary", palette.secondary);
        context.insert("gradient", &palette.gradient());
        context.insert("images", include_urls);

        let html = self.tera.render(TEMPLATE_NAME, &context)?;
        Ok(FallbackEmail { subject, html })
    }
}

/// "Create a welcome email for a bakery" -> "Welcome email for a bakery".
pub fn subject_from_instruction(instruction_text: &str) -> String {
    let first_line = instruction_text
        .split(['\n', '.', '!', '?'])
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    let mut words: Vec<&str> = first_line.split_whitespace().collect();
    if words.first().is_some_and(|word| LEADING_VERBS.contains(&word.to_lowercase().as_str())) {
        words.remove(0);
        if words.first().is_some_and(|word| LEADING_ARTICLES.contains(&word.to_lowercase().as_str()))
        {
            words.remove(0);
        }
    }

    let joined = words.join(" ");
    let mut subject: String = joined.chars().take(SUBJECT_MAX_CHARS).collect();
    if subject.is_empty() {
        return "News from our team".to_string();
    }
    if let Some(first) = subject.chars().next() {
        let upper: String = first.to_uppercase().collect();
        subject.replace_range(..first.len_utf8(), &upper);
    }
    subject
}

#[cfg(test)]
mod tests {
    use super::{subject_from_instruction, FallbackGenerator};

    #[test]
    fn subject_strips_leading_command() {
        assert_eq!(
            subject_from_instruction("Create a welcome email for a bakery"),
            "Welcome email for a bakery"
        );
        assert_eq!(subject_from_instruction("crie uma promoção de inverno. Use azul"), "Promoção de inverno");
        assert_eq!(subject_from_instruction("   "), "News from our team");
    }

    #[test]
    fn render_is_deterministic_and_complete() {
        let generator = FallbackGenerator::new().expect("template should compile");
        let first = generator
            .render("Create a welcome email for a bakery", &["https://cdn.test/bread.png"])
            .expect("render");
        let second = generator
            .render("Create a welcome email for a bakery", &["https://cdn.test/bread.png"])
            .expect("render");

        assert_eq!(first, second);
        assert!(first.html.starts_with("<!DOCTYPE html>"));
        assert!(first.html.contains("Unsubscribe"));
        assert!(first.html.contains("max-width:600px"));
        assert!(first.html.contains("#6366f1"));
        assert!(first.html.contains("Learn More"));
        assert!(first.html.contains("<img src=\"https:&#x2F;&#x2F;cdn.test&#x2F;bread.png\""));
    }

    #[test]
    fn instruction_text_is_escaped() {
        let generator = FallbackGenerator::new().expect("template should compile");
        let email = generator.render("<script>alert(1)</script> promo", &[]).expect("render");
        assert!(!email.html.contains("<script>"));
    }
}
