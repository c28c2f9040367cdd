//! File-based conversation storage.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::model::Conversation;
use crate::store::conversation::ConversationStore;
use crate::store::error::StorageResult;

use super::{read_yaml, safe_segment, write_yaml};

/// File-based implementation of `ConversationStore`.
///
/// Conversation keys are arbitrary platform strings, so file names use the
/// SHA-256 of the key.
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    conversations_dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(conversations_dir: impl Into<PathBuf>) -> Self {
        Self {
            conversations_dir: conversations_dir.into(),
        }
    }

    fn path(&self, platform: &str, conversation_key: &str) -> PathBuf {
        let digest = Sha256::digest(conversation_key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.conversations_dir
            .join(safe_segment(platform))
            .join(format!("{name}.yaml"))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn get(
        &self,
        platform: &str,
        conversation_key: &str,
    ) -> StorageResult<Option<Conversation>> {
        read_yaml(&self.path(platform, conversation_key)).await
    }

    async fn save(&self, conversation: &Conversation) -> StorageResult<()> {
        let path = self.path(&conversation.platform, &conversation.conversation_key);
        write_yaml(&path, conversation).await
    }
}
