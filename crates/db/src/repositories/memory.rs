use std::collections::HashMap;

use tokio::sync::RwLock;

use mailsmith_core::domain::document::{DocumentId, EmailDocument};
use mailsmith_core::domain::message::{ConversationId, MessageRecord, MessageRole};

use super::{DocumentRepository, MessageLogRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<String, EmailDocument>>,
}

#[async_trait::async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<EmailDocument>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&id.0).cloned())
    }

    async fn save(&self, document: EmailDocument) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.0.clone(), document);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageLogRepository {
    conversations: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

#[async_trait::async_trait]
impl MessageLogRepository for InMemoryMessageLogRepository {
    async fn append(&self, message: MessageRecord) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(message.conversation_id.0.clone()).or_default().push(message);
        Ok(())
    }

    async fn recent_assistant(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let Some(messages) = conversations.get(&conversation_id.0) else {
            return Ok(Vec::new());
        };

        let mut assistant: Vec<&MessageRecord> =
            messages.iter().filter(|message| message.role == MessageRole::Assistant).collect();
        // Stable sort keeps append order for equal timestamps.
        assistant.sort_by_key(|message| message.created_at);
        Ok(assistant.into_iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use mailsmith_core::domain::document::{DocumentContent, DocumentId, EmailDocument};
    use mailsmith_core::domain::message::{ConversationId, MessageId, MessageRecord, MessageRole};

    use crate::repositories::{
        DocumentRepository, InMemoryDocumentRepository, InMemoryMessageLogRepository,
        MessageLogRepository,
    };

    #[tokio::test]
    async fn in_memory_document_repo_round_trip() {
        let repo = InMemoryDocumentRepository::default();
        let document = EmailDocument::new(
            DocumentId("DOC-1".to_string()),
            DocumentContent { html: "<p>hi</p>".to_string(), ..DocumentContent::default() },
            Utc::now(),
        );

        repo.save(document.clone()).await.expect("save document");
        let found = repo.find_by_id(&document.id).await.expect("find document");

        assert_eq!(found, Some(document));
    }

    #[tokio::test]
    async fn in_memory_log_returns_latest_assistant_turns() {
        let repo = InMemoryMessageLogRepository::default();
        let now = Utc::now();
        for (id, role) in
            [("M-1", MessageRole::Assistant), ("M-2", MessageRole::User), ("M-3", MessageRole::Assistant)]
        {
            repo.append(MessageRecord {
                id: MessageId(id.to_string()),
                conversation_id: ConversationId("CONV-1".to_string()),
                role,
                content: String::new(),
                artifacts: None,
                metadata: None,
                created_at: now,
            })
            .await
            .expect("append");
        }

        let recent =
            repo.recent_assistant(&ConversationId("CONV-1".to_string()), 10).await.expect("recent");
        let ids: Vec<&str> = recent.iter().map(|m| m.id.0.as_str()).collect();
        assert_eq!(ids, vec!["M-3", "M-1"]);

        let other =
            repo.recent_assistant(&ConversationId("CONV-2".to_string()), 10).await.expect("recent");
        assert!(other.is_empty());
    }
}
