use std::fs;
use std::path::Path;

use mailsmith_core::domain::instruction::{ImageReference, Instruction};
use mailsmith_core::sanitizer::ResponseSanitizer;
use mailsmith_core::text::lint;
use serde_json::json;

use crate::commands::{read_html, to_data, CommandResult};

/// Runs a saved model response through the sanitizer. The cleaned html goes
/// to `output` when given, otherwise it is embedded in the payload.
pub fn run(input: &Path, include_urls: &[String], output: Option<&Path>) -> CommandResult {
    let raw = match read_html("sanitize", input) {
        Ok(raw) => raw,
        Err(failure) => return failure,
    };

    let mut instruction = Instruction::new("sanitize");
    instruction.images =
        include_urls.iter().map(|url| ImageReference::include(url.as_str())).collect();
    if let Err(error) = instruction.validate() {
        return CommandResult::failure("sanitize", "input", error.to_string(), 2);
    }

    let sanitized = ResponseSanitizer.sanitize(&raw, &instruction.images);
    if !sanitized.is_document() {
        return CommandResult::failure(
            "sanitize",
            "no_markup",
            format!("`{}` contains no html document", input.display()),
            7,
        );
    }

    let lint_report = lint(&sanitized.html);
    let html_field = match output {
        Some(path) => {
            if let Err(error) = fs::write(path, &sanitized.html) {
                return CommandResult::failure(
                    "sanitize",
                    "output",
                    format!("could not write `{}`: {error}", path.display()),
                    6,
                );
            }
            None
        }
        None => Some(sanitized.html.clone()),
    };

    CommandResult::success_with_data(
        "sanitize",
        format!("sanitized {} bytes into {} bytes", raw.len(), sanitized.html.len()),
        Some(json!({
            "html": html_field,
            "report": to_data(&sanitized.report),
            "lint": to_data(&lint_report),
        })),
    )
}
