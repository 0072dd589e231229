use async_trait::async_trait;
use thiserror::Error;

use mailsmith_core::domain::document::{DocumentId, EmailDocument};
use mailsmith_core::domain::message::{ConversationId, MessageRecord};

pub mod document;
pub mod memory;
pub mod message_log;

pub use document::SqlDocumentRepository;
pub use memory::{InMemoryDocumentRepository, InMemoryMessageLogRepository};
pub use message_log::SqlMessageLogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl RepositoryError {
    /// Connection-level misconfiguration. Everything else is a per-lookup miss
    /// that readers may log and skip.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::Configuration(_))
                | Self::Database(sqlx::Error::PoolClosed)
        )
    }
}

/// Primary document store, keyed by document id.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<EmailDocument>, RepositoryError>;
    async fn save(&self, document: EmailDocument) -> Result<(), RepositoryError>;
}

/// Append-only conversation log.
#[async_trait]
pub trait MessageLogRepository: Send + Sync {
    async fn append(&self, message: MessageRecord) -> Result<(), RepositoryError>;

    /// Assistant-authored entries, newest first.
    async fn recent_assistant(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

/// Fixed-width RFC3339 so text ordering in SQLite matches time ordering.
pub(crate) fn format_timestamp(value: &chrono::DateTime<chrono::Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
