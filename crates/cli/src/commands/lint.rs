use std::path::Path;

use mailsmith_core::deliverability::assess;
use mailsmith_core::text::{extract_subject, lint};
use serde_json::json;

use crate::commands::{read_html, to_data, CommandResult};

/// Exit code 1 when lint issues are found so the command can gate a build.
/// Deliverability scores are reported alongside but never fail the run.
pub fn run(input: &Path, subject: Option<&str>) -> CommandResult {
    let html = match read_html("lint", input) {
        Ok(html) => html,
        Err(failure) => return failure,
    };

    let report = lint(&html);
    let subject = subject.map(str::to_string).or_else(|| extract_subject(&html)).unwrap_or_default();
    let deliverability = assess(&html, &subject);
    let message = if report.is_clean() {
        format!("no issues (score {}, spam risk {:?})", report.score, deliverability.spam.risk)
    } else {
        format!("{} issue(s) (score {})", report.issues.len(), report.score)
    };

    let mut result = CommandResult::success_with_data(
        "lint",
        message,
        Some(json!({
            "lint": to_data(&report),
            "deliverability": to_data(&deliverability),
        })),
    );
    if !report.is_clean() {
        result.exit_code = 1;
    }
    result
}
