use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Operation a caller may declare up front instead of leaving it to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Edit,
    Analyze,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Analyze => "analyze",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "edit" => Some(Self::Edit),
            "analyze" | "improve" => Some(Self::Analyze),
            _ => None,
        }
    }
}

/// Structured before/after diff attached by an editor UI when the user
/// selected a concrete element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetElement {
    pub original_text: Option<String>,
    pub new_text: Option<String>,
    pub element_type: Option<String>,
    pub selector: Option<String>,
}

impl TargetElement {
    /// Both sides of the diff present and non-blank.
    pub fn is_structured_diff(&self) -> bool {
        fn filled(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|text| !text.trim().is_empty())
        }
        filled(&self.original_text) && filled(&self.new_text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageIntent {
    Analyze,
    Include,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: String,
    pub intent: ImageIntent,
}

impl ImageReference {
    pub fn include(url: impl Into<String>) -> Self {
        Self { url: url.into(), intent: ImageIntent::Include }
    }

    pub fn analyze(url: impl Into<String>) -> Self {
        Self { url: url.into(), intent: ImageIntent::Analyze }
    }
}

/// Splits a mixed image list into (analyze-only, embed-in-output) preserving order.
pub fn partition_images(images: &[ImageReference]) -> (Vec<&ImageReference>, Vec<&ImageReference>) {
    images.iter().partition(|image| image.intent == ImageIntent::Analyze)
}

/// Request-scoped user instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
    pub declared_operation: Option<Operation>,
    pub target_element: Option<TargetElement>,
    pub preserve_structure: Option<bool>,
    pub priority: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageReference>,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let has_diff = self.target_element.as_ref().is_some_and(TargetElement::is_structured_diff);
        if self.text.trim().is_empty() && !has_diff {
            return Err(DomainError::InvalidInstruction(
                "instruction text must not be empty".to_owned(),
            ));
        }
        for image in &self.images {
            let url = image.url.trim();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(DomainError::InvalidImageReference(image.url.clone()));
            }
        }
        Ok(())
    }

    pub fn include_urls(&self) -> Vec<&str> {
        self.images
            .iter()
            .filter(|image| image.intent == ImageIntent::Include)
            .map(|image| image.url.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{partition_images, ImageReference, Instruction, Operation, TargetElement};
    use crate::errors::DomainError;

    #[test]
    fn operation_parse_accepts_improve_alias() {
        assert_eq!(Operation::parse(" Improve "), Some(Operation::Analyze));
        assert_eq!(Operation::parse("EDIT"), Some(Operation::Edit));
        assert_eq!(Operation::parse("delete"), None);
    }

    #[test]
    fn structured_diff_requires_both_sides() {
        let half = TargetElement { original_text: Some("Buy Now".to_owned()), ..Default::default() };
        assert!(!half.is_structured_diff());

        let blank = TargetElement {
            original_text: Some("Buy Now".to_owned()),
            new_text: Some("  ".to_owned()),
            ..Default::default()
        };
        assert!(!blank.is_structured_diff());

        let full = TargetElement {
            original_text: Some("Buy Now".to_owned()),
            new_text: Some("Shop Now".to_owned()),
            ..Default::default()
        };
        assert!(full.is_structured_diff());
    }

    #[test]
    fn partition_keeps_input_order() {
        let images = vec![
            ImageReference::include("https://cdn.test/a.png"),
            ImageReference::analyze("https://cdn.test/ref.png"),
            ImageReference::include("https://cdn.test/b.png"),
        ];
        let (analyze, include) = partition_images(&images);

        assert_eq!(analyze.len(), 1);
        assert_eq!(include[0].url, "https://cdn.test/a.png");
        assert_eq!(include[1].url, "https://cdn.test/b.png");
    }

    #[test]
    fn blank_instruction_without_diff_is_rejected() {
        let error = Instruction::new("   ").validate().expect_err("blank text should fail");
        assert!(matches!(error, DomainError::InvalidInstruction(_)));
    }

    #[test]
    fn relative_image_urls_are_rejected() {
        let mut instruction = Instruction::new("add the banner");
        instruction.images.push(ImageReference::include("/uploads/banner.png"));

        let error = instruction.validate().expect_err("relative url should fail");
        assert_eq!(error, DomainError::InvalidImageReference("/uploads/banner.png".to_owned()));
    }
}
