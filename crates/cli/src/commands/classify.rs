use std::path::Path;

use mailsmith_core::classifier::{OperationClassifier, RuleKind};
use mailsmith_core::compiler::{InstructionCompiler, PromptTemplate, TemperatureProfile};
use mailsmith_core::config::{AppConfig, LoadOptions};
use mailsmith_core::domain::instruction::Operation;
use serde::Serialize;

use crate::commands::{read_html, to_data, CommandResult};

#[derive(Debug, Serialize)]
struct ClassifyReport {
    operation: &'static str,
    confidence: u8,
    rule: RuleKind,
    has_existing_document: bool,
    preserve_structure: bool,
    template: PromptTemplate,
    temperature: f32,
}

/// Dry run of classification and template selection; no model is called.
pub fn run(text: &str, html_file: Option<&Path>, declared: Option<&str>) -> CommandResult {
    let declared_operation = match declared {
        Some(value) => match Operation::parse(value) {
            Some(operation) => Some(operation),
            None => {
                return CommandResult::failure(
                    "classify",
                    "input",
                    format!("unknown operation `{value}` (expected create|edit|analyze)"),
                    2,
                );
            }
        },
        None => None,
    };

    let html = match html_file.map(|path| read_html("classify", path)).transpose() {
        Ok(html) => html,
        Err(failure) => return failure,
    };

    // An unloadable config falls back to defaults; classification needs no secrets.
    let pipeline = AppConfig::load(LoadOptions::default())
        .map(|config| config.pipeline)
        .unwrap_or_default();
    let classifier = OperationClassifier::new(pipeline.min_document_chars);
    let classification = classifier.classify(text, html.as_deref(), declared_operation, None);

    let base_html = html.as_deref().filter(|_| classification.has_existing_document);
    let compiled = InstructionCompiler::new(TemperatureProfile::from(&pipeline)).compile(
        classification.operation,
        text,
        base_html,
        None,
        &[],
    );
    let report = ClassifyReport {
        operation: classification.operation.as_str(),
        confidence: classification.confidence,
        rule: classification.rule,
        has_existing_document: classification.has_existing_document,
        preserve_structure: classification.preserve_structure,
        template: compiled.template,
        temperature: compiled.temperature,
    };

    CommandResult::success_with_data(
        "classify",
        format!(
            "{} ({}% confidence) via {:?} template",
            report.operation, report.confidence, report.template
        ),
        to_data(&report),
    )
}
