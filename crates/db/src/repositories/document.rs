use sqlx::Row;

use mailsmith_core::domain::document::{DocumentContent, DocumentId, EmailDocument};

use super::{decode_err, format_timestamp, parse_timestamp, DocumentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<EmailDocument, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let html: String = row.try_get("html").map_err(decode_err)?;
    let subject: String = row.try_get("subject").map_err(decode_err)?;
    let text: String = row.try_get("text").map_err(decode_err)?;
    let preview_text: String = row.try_get("preview_text").map_err(decode_err)?;
    let version: i64 = row.try_get("version").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(EmailDocument {
        id: DocumentId(id),
        content: DocumentContent { html, subject, text, preview_text },
        version,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<EmailDocument>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, html, subject, text, preview_text, version, created_at, updated_at
             FROM email_document WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn save(&self, document: EmailDocument) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO email_document (id, html, subject, text, preview_text, version,
                                         created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 html = excluded.html,
                 subject = excluded.subject,
                 text = excluded.text,
                 preview_text = excluded.preview_text,
                 version = excluded.version,
                 updated_at = excluded.updated_at",
        )
        .bind(&document.id.0)
        .bind(&document.content.html)
        .bind(&document.content.subject)
        .bind(&document.content.text)
        .bind(&document.content.preview_text)
        .bind(document.version)
        .bind(format_timestamp(&document.created_at))
        .bind(format_timestamp(&document.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
