use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The html/subject/text triple plus the preview line shown by inbox clients.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub html: String,
    pub subject: String,
    pub text: String,
    pub preview_text: String,
}

impl DocumentContent {
    /// Non-empty after trimming. Whitespace-only html never counts as a document.
    pub fn has_html(&self) -> bool {
        !self.html.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDocument {
    pub id: DocumentId,
    pub content: DocumentContent,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailDocument {
    pub fn new(id: DocumentId, content: DocumentContent, now: DateTime<Utc>) -> Self {
        Self { id, content, version: 1, created_at: now, updated_at: now }
    }
}
