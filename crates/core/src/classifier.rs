use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::instruction::{Operation, TargetElement};

/// Modification verbs, matched as case-insensitive substrings.
const EDIT_KEYWORDS: &[&str] = &[
    "change",
    "update",
    "fix",
    "replace",
    "modify",
    "adjust",
    "swap",
    "rename",
    "remove",
    "mude",
    "mudar",
    "altere",
    "alterar",
    "corrija",
    "corrigir",
    "substitua",
    "substituir",
    "troque",
    "trocar",
    "modifique",
    "modificar",
    "remova",
];

fn edit_phrase_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\b(make|set|turn)\b[^.]*\b(to|into)\b",
            r"(?i)\bmake\s+(the|it|this|that)\b",
            r"(?i)\b(deixe|coloque)\b[^.]*\b(em|como)\b",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

pub fn mentions_edit(text: &str) -> bool {
    let lowered = text.to_lowercase();
    EDIT_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
        || edit_phrase_patterns().iter().any(|pattern| pattern.is_match(text))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Declared,
    StructuredDiff,
    MissingDocument,
    EditKeywords,
    AnalyzeDefault,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub operation: Operation,
    pub has_existing_document: bool,
    pub preserve_structure: bool,
    pub confidence: u8,
    pub rule: RuleKind,
}

/// Everything a rule may look at. Built once per classification.
#[derive(Clone, Copy, Debug)]
pub struct ClassificationInput<'a> {
    pub instruction_text: &'a str,
    pub has_existing_document: bool,
    pub declared_operation: Option<Operation>,
    pub target_element: Option<&'a TargetElement>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassificationRule {
    Declared,
    StructuredDiff,
    MissingDocument,
    EditKeywords,
    AnalyzeDefault,
}

impl ClassificationRule {
    pub fn kind(self) -> RuleKind {
        match self {
            Self::Declared => RuleKind::Declared,
            Self::StructuredDiff => RuleKind::StructuredDiff,
            Self::MissingDocument => RuleKind::MissingDocument,
            Self::EditKeywords => RuleKind::EditKeywords,
            Self::AnalyzeDefault => RuleKind::AnalyzeDefault,
        }
    }

    pub fn evaluate(self, input: &ClassificationInput<'_>) -> Option<Classification> {
        let has_doc = input.has_existing_document;
        let verdict = |operation, preserve_structure, confidence| Classification {
            operation,
            has_existing_document: has_doc,
            preserve_structure,
            confidence,
            rule: self.kind(),
        };

        match self {
            Self::Declared => match input.declared_operation? {
                Operation::Create => Some(verdict(Operation::Create, false, 95)),
                Operation::Edit if has_doc => Some(verdict(Operation::Edit, true, 95)),
                Operation::Edit => Some(verdict(Operation::Create, false, 80)),
                Operation::Analyze => None,
            },
            // A diff against nothing cannot be applied; let MissingDocument decide.
            Self::StructuredDiff => input
                .target_element
                .filter(|target| has_doc && target.is_structured_diff())
                .map(|_| verdict(Operation::Edit, true, 90)),
            Self::MissingDocument => (!has_doc).then(|| verdict(Operation::Create, false, 85)),
            Self::EditKeywords => mentions_edit(input.instruction_text)
                .then(|| verdict(Operation::Edit, true, 80)),
            Self::AnalyzeDefault => Some(verdict(Operation::Analyze, true, 60)),
        }
    }
}

pub const DEFAULT_RULES: [ClassificationRule; 5] = [
    ClassificationRule::Declared,
    ClassificationRule::StructuredDiff,
    ClassificationRule::MissingDocument,
    ClassificationRule::EditKeywords,
    ClassificationRule::AnalyzeDefault,
];

/// Ordered first-match-wins decision table over [`ClassificationRule`]s.
#[derive(Clone, Debug)]
pub struct OperationClassifier {
    rules: Vec<ClassificationRule>,
    min_document_chars: usize,
}

impl Default for OperationClassifier {
    fn default() -> Self {
        Self::new(50)
    }
}

impl OperationClassifier {
    pub fn new(min_document_chars: usize) -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec(), min_document_chars)
    }

    pub fn with_rules(rules: Vec<ClassificationRule>, min_document_chars: usize) -> Self {
        Self { rules, min_document_chars }
    }

    pub fn has_existing_document(&self, resolved_html: Option<&str>) -> bool {
        resolved_html.is_some_and(|html| html.trim().chars().count() >= self.min_document_chars)
    }

    pub fn classify(
        &self,
        instruction_text: &str,
        resolved_html: Option<&str>,
        declared_operation: Option<Operation>,
        target_element: Option<&TargetElement>,
    ) -> Classification {
        let input = ClassificationInput {
            instruction_text,
            has_existing_document: self.has_existing_document(resolved_html),
            declared_operation,
            target_element,
        };

        self.rules.iter().find_map(|rule| rule.evaluate(&input)).unwrap_or(Classification {
            operation: Operation::Create,
            has_existing_document: input.has_existing_document,
            preserve_structure: false,
            confidence: 50,
            rule: RuleKind::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{mentions_edit, ClassificationRule, OperationClassifier, RuleKind};
    use crate::domain::instruction::{Operation, TargetElement};

    const DOCUMENT: &str = "<!DOCTYPE html><html><head><title>Sale</title></head><body><a class=\"cta\">Buy Now</a></body></html>";

    fn diff(original: &str, new: &str) -> TargetElement {
        TargetElement {
            original_text: Some(original.to_string()),
            new_text: Some(new.to_string()),
            element_type: Some("button".to_string()),
            selector: None,
        }
    }

    #[test]
    fn declared_create_is_honored_even_with_document() {
        let result = OperationClassifier::default().classify(
            "start over",
            Some(DOCUMENT),
            Some(Operation::Create),
            None,
        );
        assert_eq!(result.operation, Operation::Create);
        assert_eq!(result.confidence, 95);
        assert_eq!(result.rule, RuleKind::Declared);
    }

    #[test]
    fn declared_edit_without_document_is_downgraded_to_create() {
        let result = OperationClassifier::default().classify(
            "tweak the header",
            None,
            Some(Operation::Edit),
            None,
        );
        assert_eq!(result.operation, Operation::Create);
        assert_eq!(result.confidence, 80);
        assert!(!result.has_existing_document);
    }

    #[test]
    fn declared_analyze_falls_through_to_later_rules() {
        let result = OperationClassifier::default().classify(
            "make it pop",
            Some(DOCUMENT),
            Some(Operation::Analyze),
            None,
        );
        assert_eq!(result.rule, RuleKind::EditKeywords);
    }

    #[test]
    fn structured_diff_is_a_surgical_edit() {
        let target = diff("Buy Now", "Shop Now");
        let result =
            OperationClassifier::default().classify("", Some(DOCUMENT), None, Some(&target));
        assert_eq!(result.operation, Operation::Edit);
        assert_eq!(result.confidence, 90);
        assert!(result.preserve_structure);
    }

    #[test]
    fn stub_html_below_threshold_counts_as_missing() {
        let classifier = OperationClassifier::default();
        assert!(!classifier.has_existing_document(Some("<html></html>")));
        let result = classifier.classify("update the footer", Some("<p></p>"), None, None);
        assert_eq!(result.operation, Operation::Create);
        assert_eq!(result.confidence, 85);
    }

    #[test]
    fn keyword_edit_detects_color_change() {
        let result = OperationClassifier::default().classify(
            "change the button color to green",
            Some(DOCUMENT),
            None,
            None,
        );
        assert_eq!(result.operation, Operation::Edit);
        assert_eq!(result.confidence, 80);
        assert!(result.preserve_structure);
    }

    #[test]
    fn portuguese_keywords_are_recognised() {
        assert!(mentions_edit("Mude a cor do botão para verde"));
        assert!(mentions_edit("por favor CORRIJA o rodapé"));
        assert!(mentions_edit("set the headline to Summer Sale"));
        assert!(!mentions_edit("looks great, thanks"));
    }

    #[test]
    fn document_without_edit_wording_defaults_to_analyze() {
        let result = OperationClassifier::default().classify(
            "what do you think about this?",
            Some(DOCUMENT),
            None,
            None,
        );
        assert_eq!(result.operation, Operation::Analyze);
        assert_eq!(result.confidence, 60);
        assert!(result.preserve_structure);
    }

    #[test]
    fn empty_rule_list_hits_terminal_fallback() {
        let classifier = OperationClassifier::with_rules(Vec::new(), 50);
        let result = classifier.classify("anything", Some(DOCUMENT), None, None);
        assert_eq!(result.operation, Operation::Create);
        assert_eq!(result.confidence, 50);
        assert_eq!(result.rule, RuleKind::Fallback);
    }

    #[test]
    fn rules_can_be_reordered_without_touching_each_other() {
        let classifier = OperationClassifier::with_rules(
            vec![ClassificationRule::EditKeywords, ClassificationRule::Declared],
            50,
        );
        let result =
            classifier.classify("replace the logo", Some(DOCUMENT), Some(Operation::Create), None);
        assert_eq!(result.rule, RuleKind::EditKeywords);
    }

    #[test]
    fn classification_is_total_and_never_edits_without_document() {
        let classifier = OperationClassifier::default();
        let declared = [None, Some(Operation::Create), Some(Operation::Edit), Some(Operation::Analyze)];
        let documents = [None, Some(""), Some("<p>x</p>"), Some(DOCUMENT)];
        let targets = [None, Some(TargetElement::default()), Some(diff("Buy Now", "Shop Now"))];
        let texts = ["", "change the title", "Crie um email", "thoughts?"];

        for declared_operation in declared {
            for document in documents {
                for target in &targets {
                    for text in texts {
                        let result =
                            classifier.classify(text, document, declared_operation, target.as_ref());
                        assert!(result.confidence <= 100);
                        if !classifier.has_existing_document(document) {
                            assert_eq!(
                                result.operation,
                                Operation::Create,
                                "no document must force create: {declared_operation:?} {target:?} {text}"
                            );
                        }
                    }
                }
            }
        }
    }
}
