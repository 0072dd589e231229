use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use mailsmith_core::domain::document::{DocumentContent, DocumentId, EmailDocument};
use mailsmith_core::domain::message::{
    html_artifact, ConversationId, MessageId, MessageRecord, MessageRole,
};
use mailsmith_core::text::{extract_subject, plain_text, preview_text};
use mailsmith_db::repositories::{DocumentRepository, MessageLogRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("refusing to persist empty or non-document html")]
    EmptyContent,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn is_document(html: &str) -> bool {
    let lowered = html.to_ascii_lowercase();
    !html.trim().is_empty() && (lowered.contains("<html") || lowered.contains("<body"))
}

/// Writes sanitized html back to storage: through to the primary record when
/// a document id is known, otherwise appended to the conversation log.
pub struct ReconciliationWriter {
    documents: Arc<dyn DocumentRepository>,
    messages: Arc<dyn MessageLogRepository>,
}

impl ReconciliationWriter {
    pub fn new(documents: Arc<dyn DocumentRepository>, messages: Arc<dyn MessageLogRepository>) -> Self {
        Self { documents, messages }
    }

    /// Subject precedence: explicit, then `<title>`, then the stored subject.
    pub async fn commit(
        &self,
        document_id: &DocumentId,
        html: &str,
        subject: Option<&str>,
    ) -> Result<EmailDocument, WriteError> {
        if !is_document(html) {
            return Err(WriteError::EmptyContent);
        }

        let now = Utc::now();
        let existing = self.documents.find_by_id(document_id).await?;
        let previous_subject = existing.as_ref().map(|doc| doc.content.subject.clone());
        let subject = subject
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| extract_subject(html))
            .or(previous_subject)
            .unwrap_or_default();

        let text = plain_text(html);
        let content = DocumentContent {
            html: html.to_string(),
            subject,
            preview_text: preview_text(&text),
            text,
        };

        let document = match existing {
            Some(previous) => EmailDocument {
                content,
                version: previous.version + 1,
                updated_at: now,
                ..previous
            },
            None => EmailDocument::new(document_id.clone(), content, now),
        };

        self.documents.save(document.clone()).await?;
        info!(
            event_name = "writer.commit",
            document_id = %document.id,
            version = document.version,
            html_bytes = document.content.html.len(),
            "document committed"
        );
        Ok(document)
    }

    pub async fn append_to_log(
        &self,
        conversation_id: &ConversationId,
        html: &str,
    ) -> Result<MessageRecord, WriteError> {
        if !is_document(html) {
            return Err(WriteError::EmptyContent);
        }

        let message = MessageRecord {
            id: MessageId(Uuid::new_v4().to_string()),
            conversation_id: conversation_id.clone(),
            role: MessageRole::Assistant,
            content: preview_text(&plain_text(html)),
            artifacts: Some(html_artifact(html)),
            metadata: None,
            created_at: Utc::now(),
        };
        self.messages.append(message.clone()).await?;
        info!(
            event_name = "writer.append_to_log",
            conversation_id = %conversation_id,
            message_id = %message.id.0,
            "html appended to conversation log"
        );
        Ok(message)
    }
}
