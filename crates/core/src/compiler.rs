use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::domain::instruction::{
    partition_images, ImageIntent, ImageReference, Operation, TargetElement,
};
use crate::palette::Industry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    SurgicalEdit,
    HolisticEdit,
    AnalyzeImprove,
    Create,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Chat `content` field: a bare string, or multimodal parts when images ride along.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl UserContent {
    /// Concatenated text parts, ignoring image parts.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledInstruction {
    pub template: PromptTemplate,
    pub system_prompt: String,
    pub user_content: UserContent,
    pub temperature: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemperatureProfile {
    pub create: f32,
    pub edit: f32,
    pub analyze: f32,
}

impl Default for TemperatureProfile {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for TemperatureProfile {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            create: config.create_temperature,
            edit: config.edit_temperature,
            analyze: config.analyze_temperature,
        }
    }
}

const OUTPUT_CONTRACT: &str = "\
OUTPUT RULES:
- Reply with exactly one complete HTML document, starting with <!DOCTYPE html> and ending with </html>.
- Do not add explanations, greetings, markdown fences or any text outside the HTML.
- Never use emoji anywhere in the document.
- Never invent image URLs and never use placeholder or example domains.
- Email-safe markup only: table-based layout, max-width 600px, no JavaScript.";

#[derive(Clone, Debug, Default)]
pub struct InstructionCompiler {
    temperatures: TemperatureProfile,
}

impl InstructionCompiler {
    pub fn new(temperatures: TemperatureProfile) -> Self {
        Self { temperatures }
    }

    pub fn select_template(
        operation: Operation,
        resolved_html: Option<&str>,
        target_element: Option<&TargetElement>,
    ) -> PromptTemplate {
        let has_html = resolved_html.is_some_and(|html| !html.trim().is_empty());
        let has_diff = target_element.is_some_and(TargetElement::is_structured_diff);
        match operation {
            Operation::Edit if has_html && has_diff => PromptTemplate::SurgicalEdit,
            Operation::Edit if has_html => PromptTemplate::HolisticEdit,
            Operation::Analyze if has_html => PromptTemplate::AnalyzeImprove,
            _ => PromptTemplate::Create,
        }
    }

    pub fn compile(
        &self,
        operation: Operation,
        instruction_text: &str,
        resolved_html: Option<&str>,
        target_element: Option<&TargetElement>,
        images: &[ImageReference],
    ) -> CompiledInstruction {
        let template = Self::select_template(operation, resolved_html, target_element);
        let html = resolved_html.unwrap_or_default();

        let (system_prompt, body, temperature) = match (template, target_element) {
            (PromptTemplate::SurgicalEdit, Some(target)) => (
                surgical_system_prompt(),
                surgical_body(instruction_text, html, target),
                self.temperatures.edit,
            ),
            (PromptTemplate::HolisticEdit, _) | (PromptTemplate::SurgicalEdit, None) => (
                holistic_system_prompt(),
                document_body("REQUESTED CHANGE", instruction_text, html),
                self.temperatures.edit,
            ),
            (PromptTemplate::AnalyzeImprove, _) => (
                analyze_system_prompt(),
                document_body("USER REQUEST", instruction_text, html),
                self.temperatures.analyze,
            ),
            (PromptTemplate::Create, _) => (
                create_system_prompt(Industry::detect(instruction_text)),
                format!("Create the email described below.\n\nREQUEST:\n{}", instruction_text.trim()),
                self.temperatures.create,
            ),
        };

        CompiledInstruction {
            template,
            system_prompt,
            user_content: build_user_content(body, images),
            temperature,
        }
    }
}

fn surgical_system_prompt() -> String {
    format!(
        "You are an HTML email editor performing a surgical text replacement.\n\
         Locate the exact ORIGINAL text in the document and replace it with the exact NEW text.\n\
         Change nothing else: keep every tag, attribute, class, CSS rule, image and all other text \
         byte-for-byte identical.\n\n{OUTPUT_CONTRACT}"
    )
}

fn holistic_system_prompt() -> String {
    format!(
        "You are an HTML email editor.\n\
         Read the whole existing document, find the region the user is referring to and change only \
         that region.\n\
         FORBIDDEN SIDE EFFECTS:\n\
         - restructuring or reordering sections\n\
         - restyling elements the user did not mention\n\
         - removing or adding elements that were not requested\n\
         - rewording text outside the requested region\n\
         Return the full document with the single requested change applied.\n\n{OUTPUT_CONTRACT}"
    )
}

fn analyze_system_prompt() -> String {
    format!(
        "You are an HTML email reviewer.\n\
         Keep the essence of the existing document: same sections, same message, same brand colors.\n\
         Apply only refinement-level improvements such as clearer copy, better spacing, accessible \
         contrast and missing alt text.\n\n{OUTPUT_CONTRACT}"
    )
}

fn create_system_prompt(industry: Industry) -> String {
    let palette = industry.palette();
    format!(
        "You are an HTML email designer. Produce a complete, self-contained email document.\n\
         REQUIRED STRUCTURE (in order):\n\
         1. Header with a {gradient} background and the main title.\n\
         2. Content section with the body copy.\n\
         3. Call-to-action button (background {primary}, white text, border-radius 8px, \
         padding 14px 28px).\n\
         4. Footer with company details and an unsubscribe link.\n\
         DEFAULT VISUAL SYSTEM (use unless the request says otherwise):\n\
         - primary {primary}, secondary {secondary}, accent {accent}\n\
         - body text #1f2937 on #ffffff, page background #f3f4f6\n\
         - border-radius 12px on the main container, 24px section padding\n\
         - font-family Arial, Helvetica, sans-serif; base font-size 16px\n\
         - a <style> block in <head> plus class names on styled elements\n\n{OUTPUT_CONTRACT}",
        gradient = palette.gradient(),
        primary = palette.primary,
        secondary = palette.secondary,
        accent = palette.accent,
    )
}

fn surgical_body(instruction_text: &str, html: &str, target: &TargetElement) -> String {
    let mut body = String::new();
    body.push_str("ORIGINAL TEXT:\n");
    body.push_str(target.original_text.as_deref().unwrap_or_default());
    body.push_str("\n\nNEW TEXT:\n");
    body.push_str(target.new_text.as_deref().unwrap_or_default());
    if let Some(element_type) = target.element_type.as_deref() {
        body.push_str(&format!("\n\nELEMENT TYPE: {element_type}"));
    }
    if let Some(selector) = target.selector.as_deref() {
        body.push_str(&format!("\nSELECTOR: {selector}"));
    }
    if !instruction_text.trim().is_empty() {
        body.push_str(&format!("\n\nUSER NOTE: {}", instruction_text.trim()));
    }
    body.push_str("\n\nCURRENT DOCUMENT:\n");
    body.push_str(html);
    body
}

fn document_body(label: &str, instruction_text: &str, html: &str) -> String {
    format!("{label}:\n{}\n\nCURRENT DOCUMENT:\n{html}", instruction_text.trim())
}

fn image_section(images: &[ImageReference]) -> Option<String> {
    let (analyze, include) = partition_images(images);
    if analyze.is_empty() && include.is_empty() {
        return None;
    }

    let mut section = String::new();
    if !analyze.is_empty() {
        section.push_str("REFERENCE IMAGES (reference only, do not embed):\n");
        for image in &analyze {
            section.push_str(&format!("- {}\n", image.url));
        }
    }
    if !include.is_empty() {
        section.push_str(
            "IMAGES TO EMBED (mandatory, in this order, using these exact URLs):\n",
        );
        for (index, image) in include.iter().enumerate() {
            section.push_str(&format!("{}. <img src=\"{}\">\n", index + 1, image.url));
        }
    }
    Some(section)
}

/// Every image is attached for the model to see, each behind a label that
/// states its intent. Only `include` labels carry an embeddable tag.
fn build_user_content(body: String, images: &[ImageReference]) -> UserContent {
    let Some(section) = image_section(images) else {
        return UserContent::Text(body);
    };

    let mut parts = vec![ContentPart::Text { text: format!("{body}\n\n{section}") }];
    for (index, image) in images.iter().enumerate() {
        let label = match image.intent {
            ImageIntent::Analyze => {
                format!("Image {} (reference only, do not embed):", index + 1)
            }
            ImageIntent::Include => {
                format!("Image {} (embed with <img src=\"{}\">):", index + 1, image.url)
            }
        };
        parts.push(ContentPart::Text { text: label });
        parts.push(ContentPart::ImageUrl { image_url: ImageUrl { url: image.url.clone() } });
    }
    UserContent::Parts(parts)
}

#[cfg(test)]
mod tests {
    use super::{ContentPart, InstructionCompiler, PromptTemplate, UserContent};
    use crate::domain::instruction::{ImageReference, Operation, TargetElement};

    const HTML: &str = "<!DOCTYPE html><html><body><a class=\"cta\">Buy Now</a></body></html>";

    #[test]
    fn surgical_template_wins_when_diff_present() {
        let target = TargetElement {
            original_text: Some("Buy Now".to_string()),
            new_text: Some("Shop Now".to_string()),
            element_type: Some("button".to_string()),
            selector: Some("a.cta".to_string()),
        };
        let compiled = InstructionCompiler::default().compile(
            Operation::Edit,
            "",
            Some(HTML),
            Some(&target),
            &[],
        );

        assert_eq!(compiled.template, PromptTemplate::SurgicalEdit);
        assert!(compiled.system_prompt.contains("Change nothing else"));
        let text = compiled.user_content.text();
        assert!(text.contains("ORIGINAL TEXT:\nBuy Now"));
        assert!(text.contains("NEW TEXT:\nShop Now"));
        assert!(text.contains("SELECTOR: a.cta"));
        assert!(text.ends_with(HTML));
    }

    #[test]
    fn holistic_edit_runs_near_deterministic() {
        let compiler = InstructionCompiler::default();
        let edit = compiler.compile(Operation::Edit, "make the CTA green", Some(HTML), None, &[]);
        let create = compiler.compile(Operation::Create, "bakery welcome", None, None, &[]);

        assert_eq!(edit.template, PromptTemplate::HolisticEdit);
        assert!(edit.system_prompt.contains("FORBIDDEN SIDE EFFECTS"));
        assert!(edit.temperature < create.temperature);
        assert!(edit.temperature <= 0.2);
    }

    #[test]
    fn analyze_without_document_degrades_to_create() {
        let compiled =
            InstructionCompiler::default().compile(Operation::Analyze, "improve", None, None, &[]);
        assert_eq!(compiled.template, PromptTemplate::Create);
    }

    #[test]
    fn create_prompt_carries_structure_and_palette() {
        let compiled = InstructionCompiler::default().compile(
            Operation::Create,
            "Newsletter for our clinic",
            None,
            None,
            &[],
        );
        assert!(compiled.system_prompt.contains("unsubscribe"));
        assert!(compiled.system_prompt.contains("#059669"));
        assert!(matches!(compiled.user_content, UserContent::Text(_)));
    }

    #[test]
    fn images_switch_to_multipart_content_and_list_exact_urls() {
        let images = vec![
            ImageReference::analyze("https://cdn.test/moodboard.png"),
            ImageReference::include("https://cdn.test/hero.png"),
        ];
        let compiled = InstructionCompiler::default().compile(
            Operation::Create,
            "launch email",
            None,
            None,
            &images,
        );

        let UserContent::Parts(parts) = &compiled.user_content else {
            panic!("expected multipart content");
        };
        assert_eq!(parts.len(), 5);
        let intro = compiled.user_content.text();
        assert!(intro.contains("reference only, do not embed"));
        assert!(intro.contains("1. <img src=\"https://cdn.test/hero.png\">"));
        assert!(matches!(
            &parts[1],
            ContentPart::Text { text } if text.contains("reference only") && !text.contains("<img")
        ));
        assert!(matches!(
            &parts[2],
            ContentPart::ImageUrl { image_url } if image_url.url == "https://cdn.test/moodboard.png"
        ));
        assert!(matches!(
            &parts[3],
            ContentPart::Text { text } if text.contains("<img src=\"https://cdn.test/hero.png\">")
        ));
        assert!(matches!(
            &parts[4],
            ContentPart::ImageUrl { image_url } if image_url.url == "https://cdn.test/hero.png"
        ));
    }

    #[test]
    fn multipart_content_serializes_in_chat_completion_shape() {
        let images = vec![ImageReference::include("https://cdn.test/a.png")];
        let compiled =
            InstructionCompiler::default().compile(Operation::Create, "x", None, None, &images);
        let value = serde_json::to_value(&compiled.user_content).expect("serialize");

        assert_eq!(value[0]["type"], "text");
        assert_eq!(value[2]["type"], "image_url");
        assert_eq!(value[2]["image_url"]["url"], "https://cdn.test/a.png");
    }
}
