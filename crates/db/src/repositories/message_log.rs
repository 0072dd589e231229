use serde_json::Value;
use sqlx::Row;
use tracing::warn;

use mailsmith_core::domain::message::{ConversationId, MessageId, MessageRecord, MessageRole};

use super::{
    decode_err, format_timestamp, parse_timestamp, MessageLogRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlMessageLogRepository {
    pool: DbPool,
}

impl SqlMessageLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Older writers stored free text in these columns. Anything that is not
/// valid JSON comes back as a JSON string so readers still see it.
fn decode_payload(raw: Option<String>) -> Option<Value> {
    raw.filter(|text| !text.trim().is_empty())
        .map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn encode_payload(value: &Option<Value>) -> Result<Option<String>, RepositoryError> {
    value.as_ref().map(serde_json::to_string).transpose().map_err(decode_err)
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let conversation_id: String = row.try_get("conversation_id").map_err(decode_err)?;
    let role: String = row.try_get("role").map_err(decode_err)?;
    let content: String = row.try_get("content").map_err(decode_err)?;
    let artifacts: Option<String> = row.try_get("artifacts").map_err(decode_err)?;
    let metadata: Option<String> = row.try_get("metadata").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    let role = MessageRole::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role}`")))?;

    Ok(MessageRecord {
        id: MessageId(id),
        conversation_id: ConversationId(conversation_id),
        role,
        content,
        artifacts: decode_payload(artifacts),
        metadata: decode_payload(metadata),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl MessageLogRepository for SqlMessageLogRepository {
    async fn append(&self, message: MessageRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_message (id, conversation_id, role, content, artifacts,
                                               metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(encode_payload(&message.artifacts)?)
        .bind(encode_payload(&message.metadata)?)
        .bind(format_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_assistant(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, conversation_id, role, content, artifacts, metadata, created_at
             FROM conversation_message
             WHERE conversation_id = ? AND role IN ('assistant', 'ai')
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&conversation_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // One corrupt row must not hide the rest of the history from the resolver.
        let messages = rows
            .iter()
            .filter_map(|row| match row_to_message(row) {
                Ok(message) => Some(message),
                Err(error) => {
                    let id = row.try_get::<String, _>("id").unwrap_or_default();
                    warn!(
                        event_name = "message_log.row_skipped",
                        conversation_id = %conversation_id.0,
                        message_id = %id,
                        error = %error,
                        "skipping undecodable message row"
                    );
                    None
                }
            })
            .collect();
        Ok(messages)
    }
}
