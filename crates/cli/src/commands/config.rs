use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mailsmith_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// Where a config file is looked for when no explicit path is given.
const CONFIG_CANDIDATES: [&str; 2] = ["mailsmith.toml", "config/mailsmith.toml"];

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(field.key, field.env_key, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let fallback_models = if config.llm.fallback_models.is_empty() {
        "<none>".to_string()
    } else {
        config.llm.fallback_models.join(",")
    };

    vec![
        Field::new("database.url", "MAILSMITH_DATABASE_URL", &config.database.url),
        Field::new(
            "database.max_connections",
            "MAILSMITH_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "MAILSMITH_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", "MAILSMITH_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        Field::new("llm.api_key", "MAILSMITH_LLM_API_KEY", api_key),
        Field::new("llm.base_url", "MAILSMITH_LLM_BASE_URL", config.llm.effective_base_url()),
        Field::new("llm.model", "MAILSMITH_LLM_MODEL", &config.llm.model),
        Field::new("llm.fallback_models", "MAILSMITH_LLM_FALLBACK_MODELS", fallback_models),
        Field::new(
            "llm.timeout_secs",
            "MAILSMITH_LLM_TIMEOUT_SECS",
            config.llm.timeout_secs.to_string(),
        ),
        Field::new("llm.max_tokens", "MAILSMITH_LLM_MAX_TOKENS", config.llm.max_tokens.to_string()),
        Field::new(
            "pipeline.min_document_chars",
            "MAILSMITH_PIPELINE_MIN_DOCUMENT_CHARS",
            config.pipeline.min_document_chars.to_string(),
        ),
        Field::new(
            "pipeline.history_limit",
            "MAILSMITH_PIPELINE_HISTORY_LIMIT",
            config.pipeline.history_limit.to_string(),
        ),
        Field::new(
            "pipeline.edit_temperature",
            "MAILSMITH_PIPELINE_EDIT_TEMPERATURE",
            config.pipeline.edit_temperature.to_string(),
        ),
        Field::new(
            "pipeline.batch_concurrency",
            "MAILSMITH_PIPELINE_BATCH_CONCURRENCY",
            config.pipeline.batch_concurrency.to_string(),
        ),
        Field::new("server.bind_address", "MAILSMITH_SERVER_BIND_ADDRESS", &config.server.bind_address),
        Field::new("server.port", "MAILSMITH_SERVER_PORT", config.server.port.to_string()),
        Field::new("logging.level", "MAILSMITH_LOGGING_LEVEL", &config.logging.level),
        Field::new(
            "logging.format",
            "MAILSMITH_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

/// Keeps the provider prefix (`sk-or`, `sk`) so operators can tell keys apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.rsplit_once('-') {
        Some((prefix, _)) if prefix.len() <= 8 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn redaction_never_shows_key_material() {
        assert_eq!(redact_token("sk-or-v1-abcdef"), "sk-or-v1-***");
        assert_eq!(redact_token("longprefix-abcdef"), "<redacted>");
        assert_eq!(redact_token("sk-or-abcdef"), "sk-or-***");
        assert_eq!(redact_token("sk-abcdef"), "sk-***");
        assert_eq!(redact_token("abcdef"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: Value = "[llm]\nmodel = \"x\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
