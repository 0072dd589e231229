use mailsmith_core::config::{AppConfig, LoadOptions};
use mailsmith_core::fallback::FallbackGenerator;
use mailsmith_db::connect;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_llm_credentials(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["llm_credentials", "database_schema"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }
    checks.push(check_fallback_template());

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

/// Missing credentials are not fatal: create requests still get the fallback.
fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    if config.llm.is_enabled() {
        DoctorCheck::new(
            "llm_credentials",
            CheckStatus::Pass,
            format!(
                "{:?} configured with {} model(s) at `{}`",
                config.llm.provider,
                config.llm.model_chain().len(),
                config.llm.effective_base_url()
            ),
        )
    } else {
        DoctorCheck::new(
            "llm_credentials",
            CheckStatus::Warn,
            "no api key configured; edits will fail and creates will use the fallback template",
        )
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::new(
                "database_schema",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('email_document', 'conversation_message')",
        )
        .fetch_one(&pool)
        .await
        .map_err(|error| format!("schema query failed: {error}"))?;

        pool.close().await;
        Ok::<i64, String>(tables)
    });

    match result {
        Ok(2) => DoctorCheck::new(
            "database_schema",
            CheckStatus::Pass,
            format!("connected using `{}` and schema is present", config.database.url),
        ),
        Ok(_) => DoctorCheck::new(
            "database_schema",
            CheckStatus::Warn,
            format!("connected using `{}` but migrations are pending", config.database.url),
        ),
        Err(error) => DoctorCheck::new("database_schema", CheckStatus::Fail, error),
    }
}

fn check_fallback_template() -> DoctorCheck {
    let rendered = FallbackGenerator::new()
        .and_then(|generator| generator.render("Create a doctor check email", &[]));
    match rendered {
        Ok(email) => DoctorCheck::new(
            "fallback_template",
            CheckStatus::Pass,
            format!("fallback template rendered ({} bytes)", email.html.len()),
        ),
        Err(error) => DoctorCheck::new("fallback_template", CheckStatus::Fail, error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
