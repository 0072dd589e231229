//! Finds the current html for a document or conversation.
//!
//! The primary document record is authoritative whenever its html is
//! non-blank. Otherwise the most recent assistant turns in the message log
//! are searched with a list of artifact strategies, newest message first.
//! Storage errors are logged and treated as a miss; only connection
//! misconfiguration is raised.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use mailsmith_core::domain::document::DocumentId;
use mailsmith_core::domain::message::{ConversationId, MessageRecord};
use mailsmith_db::repositories::{DocumentRepository, MessageLogRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("document store is misconfigured: {0}")]
    Storage(#[source] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedSource {
    Primary { document_id: String },
    MessageLog { message_id: String, strategy: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedDocument {
    pub html: String,
    pub source: ResolvedSource,
}

/// One way of digging html out of a loosely typed artifact payload.
pub trait ArtifactStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, payload: &Value) -> Option<String>;
}

fn non_blank(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

/// `{"type": "html", "content": "..."}`
pub struct DirectField;

impl ArtifactStrategy for DirectField {
    fn name(&self) -> &'static str {
        "direct_field"
    }

    fn extract(&self, payload: &Value) -> Option<String> {
        let object = payload.as_object()?;
        if object.get("type").and_then(Value::as_str) != Some("html") {
            return None;
        }
        object.get("content").and_then(Value::as_str).and_then(non_blank)
    }
}

/// The direct shape inside an array, either top level or one field deep.
pub struct NestedArray;

impl ArtifactStrategy for NestedArray {
    fn name(&self) -> &'static str {
        "nested_array"
    }

    fn extract(&self, payload: &Value) -> Option<String> {
        let arrays: Vec<&Vec<Value>> = match payload {
            Value::Array(items) => vec![items],
            Value::Object(object) => object.values().filter_map(Value::as_array).collect(),
            _ => Vec::new(),
        };
        arrays.into_iter().flatten().find_map(|item| DirectField.extract(item))
    }
}

/// A JSON document serialized into a string column.
pub struct StringifiedJson;

impl ArtifactStrategy for StringifiedJson {
    fn name(&self) -> &'static str {
        "stringified_json"
    }

    fn extract(&self, payload: &Value) -> Option<String> {
        let parsed: Value = serde_json::from_str(payload.as_str()?.trim()).ok()?;
        DirectField.extract(&parsed).or_else(|| NestedArray.extract(&parsed))
    }
}

fn document_span() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?is)(?:<!doctype\s+html[^>]*>\s*)?<html\b.*?</html\s*>")
            .expect("document span pattern is valid")
    })
}

fn unescape_json_text(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\n", "\n").replace("\\t", "\t").replace("\\/", "/")
}

/// Last resort: search the serialized payload for an html document span.
pub struct MarkupScan;

impl ArtifactStrategy for MarkupScan {
    fn name(&self) -> &'static str {
        "markup_scan"
    }

    fn extract(&self, payload: &Value) -> Option<String> {
        let serialized = match payload {
            Value::String(text) => text.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };
        let unescaped = unescape_json_text(&serialized);
        document_span().find(&unescaped).map(|span| span.as_str().to_string())
    }
}

pub fn default_strategies() -> Vec<Box<dyn ArtifactStrategy>> {
    vec![Box::new(DirectField), Box::new(NestedArray), Box::new(StringifiedJson), Box::new(MarkupScan)]
}

pub struct StateResolver {
    documents: Arc<dyn DocumentRepository>,
    messages: Arc<dyn MessageLogRepository>,
    strategies: Vec<Box<dyn ArtifactStrategy>>,
    history_limit: u32,
}

impl StateResolver {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        messages: Arc<dyn MessageLogRepository>,
        history_limit: u32,
    ) -> Self {
        Self { documents, messages, strategies: default_strategies(), history_limit }
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ArtifactStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub async fn resolve(
        &self,
        document_id: Option<&DocumentId>,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Option<ResolvedDocument>, ResolveError> {
        let primary = async {
            match document_id {
                Some(id) => self.documents.find_by_id(id).await.map(|found| found.map(|doc| (id, doc))),
                None => Ok(None),
            }
        };
        let history = async {
            match conversation_id {
                Some(id) => self.messages.recent_assistant(id, self.history_limit).await,
                None => Ok(Vec::new()),
            }
        };
        let (primary, history) = tokio::join!(primary, history);

        match primary {
            Ok(Some((id, document))) if document.content.has_html() => {
                debug!(event_name = "resolver.hit", source = "primary", document_id = %id);
                return Ok(Some(ResolvedDocument {
                    html: document.content.html,
                    source: ResolvedSource::Primary { document_id: id.0.clone() },
                }));
            }
            Ok(_) => {}
            Err(error) if error.is_fatal() => return Err(ResolveError::Storage(error)),
            Err(error) => {
                warn!(event_name = "resolver.primary_failed", error = %error, "treating primary as missing");
            }
        }

        let messages = match history {
            Ok(messages) => messages,
            Err(error) if error.is_fatal() => return Err(ResolveError::Storage(error)),
            Err(error) => {
                warn!(event_name = "resolver.log_failed", error = %error, "treating message log as empty");
                Vec::new()
            }
        };

        let resolved = messages.iter().find_map(|message| self.extract_from(message));
        match &resolved {
            Some(found) => debug!(event_name = "resolver.hit", source = "message_log", source_detail = ?found.source),
            None => debug!(event_name = "resolver.miss", checked_messages = messages.len()),
        }
        Ok(resolved)
    }

    fn extract_from(&self, message: &MessageRecord) -> Option<ResolvedDocument> {
        let payloads = [message.artifacts.as_ref(), message.metadata.as_ref()];
        payloads.into_iter().flatten().find_map(|payload| {
            self.strategies.iter().find_map(|strategy| {
                strategy.extract(payload).map(|html| ResolvedDocument {
                    html,
                    source: ResolvedSource::MessageLog {
                        message_id: message.id.0.clone(),
                        strategy: strategy.name(),
                    },
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};

    use mailsmith_core::domain::document::{DocumentContent, DocumentId, EmailDocument};
    use mailsmith_core::domain::message::{
        ConversationId, MessageId, MessageRecord, MessageRole,
    };
    use mailsmith_db::repositories::{
        DocumentRepository, InMemoryDocumentRepository, InMemoryMessageLogRepository,
        MessageLogRepository, RepositoryError,
    };

    use super::{
        ArtifactStrategy, DirectField, MarkupScan, NestedArray, ResolvedSource, StateResolver,
        StringifiedJson,
    };

    const LOG_HTML: &str = "<!DOCTYPE html><html><body><p>From the log</p></body></html>";

    fn conversation() -> ConversationId {
        ConversationId("CONV-1".to_string())
    }

    async fn log_message(
        log: &InMemoryMessageLogRepository,
        id: &str,
        minutes_ago: i64,
        artifacts: Option<Value>,
        metadata: Option<Value>,
    ) {
        log.append(MessageRecord {
            id: MessageId(id.to_string()),
            conversation_id: conversation(),
            role: MessageRole::Assistant,
            content: "Here is your email".to_string(),
            artifacts,
            metadata,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        })
        .await
        .expect("append");
    }

    async fn save_primary(documents: &InMemoryDocumentRepository, html: &str) -> DocumentId {
        let id = DocumentId("DOC-1".to_string());
        documents
            .save(EmailDocument::new(
                id.clone(),
                DocumentContent { html: html.to_string(), ..DocumentContent::default() },
                Utc::now(),
            ))
            .await
            .expect("save");
        id
    }

    #[test]
    fn strategies_match_their_own_shapes() {
        let direct = json!({"type": "html", "content": LOG_HTML});
        let nested = json!([{"type": "image"}, {"type": "html", "content": LOG_HTML}]);
        let stringified = Value::String(direct.to_string());

        assert_eq!(DirectField.extract(&direct).as_deref(), Some(LOG_HTML));
        assert_eq!(DirectField.extract(&nested), None);
        assert_eq!(NestedArray.extract(&nested).as_deref(), Some(LOG_HTML));
        assert_eq!(NestedArray.extract(&json!({"items": nested})).as_deref(), Some(LOG_HTML));
        assert_eq!(StringifiedJson.extract(&stringified).as_deref(), Some(LOG_HTML));
        assert_eq!(DirectField.extract(&json!({"type": "html", "content": "  "})), None);
    }

    #[test]
    fn markup_scan_unescapes_serialized_html() {
        let payload = json!({"output": "Done! <html lang=\"en\">\n<body>hi</body></html> bye"});
        let found = MarkupScan.extract(&payload).expect("span");
        assert_eq!(found, "<html lang=\"en\">\n<body>hi</body></html>");
        assert_eq!(MarkupScan.extract(&json!({"text": "no markup"})), None);
    }

    #[tokio::test]
    async fn primary_wins_over_log() {
        let documents = Arc::new(InMemoryDocumentRepository::default());
        let log = Arc::new(InMemoryMessageLogRepository::default());
        let id = save_primary(&documents, "<html><body>Primary</body></html>").await;
        log_message(&log, "M-1", 1, Some(json!({"type": "html", "content": LOG_HTML})), None).await;

        let resolver = StateResolver::new(documents, log, 10);
        let resolved =
            resolver.resolve(Some(&id), Some(&conversation())).await.expect("resolve").expect("hit");

        assert_eq!(resolved.html, "<html><body>Primary</body></html>");
        assert_eq!(resolved.source, ResolvedSource::Primary { document_id: "DOC-1".to_string() });
    }

    #[tokio::test]
    async fn blank_primary_falls_back_to_stringified_log_artifact() {
        let documents = Arc::new(InMemoryDocumentRepository::default());
        let log = Arc::new(InMemoryMessageLogRepository::default());
        let id = save_primary(&documents, "   ").await;
        let stringified = Value::String(json!({"type": "html", "content": LOG_HTML}).to_string());
        log_message(&log, "M-1", 1, Some(stringified), None).await;

        let resolver = StateResolver::new(documents, log, 10);
        let resolved =
            resolver.resolve(Some(&id), Some(&conversation())).await.expect("resolve").expect("hit");

        assert_eq!(resolved.html, LOG_HTML);
        assert_eq!(
            resolved.source,
            ResolvedSource::MessageLog { message_id: "M-1".to_string(), strategy: "stringified_json" }
        );
    }

    #[tokio::test]
    async fn newest_message_wins_and_metadata_is_searched() {
        let documents = Arc::new(InMemoryDocumentRepository::default());
        let log = Arc::new(InMemoryMessageLogRepository::default());
        log_message(&log, "M-old", 10, Some(json!({"type": "html", "content": "<html><body>old</body></html>"})), None)
            .await;
        log_message(&log, "M-new", 1, None, Some(json!({"html_preview": LOG_HTML}))).await;

        let resolver = StateResolver::new(documents, log, 10);
        let resolved = resolver.resolve(None, Some(&conversation())).await.expect("resolve").expect("hit");

        assert_eq!(resolved.html, LOG_HTML);
        assert_eq!(
            resolved.source,
            ResolvedSource::MessageLog { message_id: "M-new".to_string(), strategy: "markup_scan" }
        );
    }

    #[tokio::test]
    async fn nothing_found_is_absent() {
        let resolver = StateResolver::new(
            Arc::new(InMemoryDocumentRepository::default()),
            Arc::new(InMemoryMessageLogRepository::default()),
            10,
        );
        assert!(resolver.resolve(None, None).await.expect("resolve").is_none());
        assert!(resolver
            .resolve(Some(&DocumentId("missing".to_string())), Some(&conversation()))
            .await
            .expect("resolve")
            .is_none());
    }

    struct FailingDocuments {
        fatal: bool,
    }

    #[async_trait]
    impl DocumentRepository for FailingDocuments {
        async fn find_by_id(&self, _id: &DocumentId) -> Result<Option<EmailDocument>, RepositoryError> {
            if self.fatal {
                Err(RepositoryError::Database(sqlx::Error::PoolClosed))
            } else {
                Err(RepositoryError::Decode("corrupt row".to_string()))
            }
        }

        async fn save(&self, _document: EmailDocument) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_errors_fall_through_unless_fatal() {
        let log = Arc::new(InMemoryMessageLogRepository::default());
        log_message(&log, "M-1", 1, Some(json!({"type": "html", "content": LOG_HTML})), None).await;
        let id = DocumentId("DOC-1".to_string());

        let lenient = StateResolver::new(Arc::new(FailingDocuments { fatal: false }), log.clone(), 10);
        let resolved =
            lenient.resolve(Some(&id), Some(&conversation())).await.expect("resolve").expect("hit");
        assert_eq!(resolved.html, LOG_HTML);

        let strict = StateResolver::new(Arc::new(FailingDocuments { fatal: true }), log, 10);
        assert!(strict.resolve(Some(&id), Some(&conversation())).await.is_err());
    }
}
