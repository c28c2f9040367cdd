//! Conversation storage trait.

use async_trait::async_trait;

use crate::model::Conversation;

use super::error::StorageResult;

/// Storage interface for conversation records.
///
/// Conversations are keyed by `(platform, conversation_key)` and are never
/// deleted by the core.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation. Returns `Ok(None)` on first contact.
    async fn get(&self, platform: &str, conversation_key: &str)
    -> StorageResult<Option<Conversation>>;

    /// Persist a conversation, replacing any previous version.
    async fn save(&self, conversation: &Conversation) -> StorageResult<()>;

    /// Load a conversation, creating and persisting it on first contact.
    async fn get_or_create(
        &self,
        platform: &str,
        conversation_key: &str,
        assistant_type: &str,
    ) -> StorageResult<Conversation> {
        if let Some(existing) = self.get(platform, conversation_key).await? {
            return Ok(existing);
        }
        let conversation = Conversation::new(platform, conversation_key, assistant_type);
        self.save(&conversation).await?;
        Ok(conversation)
    }
}
