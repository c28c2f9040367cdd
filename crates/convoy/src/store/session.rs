//! Session storage trait.

use async_trait::async_trait;

use crate::model::Session;

use super::error::StorageResult;

/// Storage interface for session records.
///
/// The store does not enforce the one-active-session rule; callers deactivate
/// the previous session before creating the next one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The active session of a conversation, if any.
    ///
    /// If several records are marked active (e.g. after a crash between two
    /// writes), the most recently started one wins.
    async fn active(&self, conversation_id: &str) -> StorageResult<Option<Session>>;

    /// All sessions of a conversation, oldest first.
    async fn list(&self, conversation_id: &str) -> StorageResult<Vec<Session>>;

    /// Persist a session, replacing any previous version.
    ///
    /// Must be atomic - either fully succeeds or has no effect.
    async fn save(&self, session: &Session) -> StorageResult<()>;

    /// Deactivate the conversation's active session, if any.
    ///
    /// Returns the deactivated session.
    async fn deactivate_active(&self, conversation_id: &str) -> StorageResult<Option<Session>> {
        let Some(mut session) = self.active(conversation_id).await? else {
            return Ok(None);
        };
        session.deactivate();
        self.save(&session).await?;
        Ok(Some(session))
    }
}
