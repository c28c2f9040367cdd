//! Deterministic slash commands.
//!
//! Everything marker-prefixed except `/command-invoke` is answered here
//! without touching the assistant backend.

mod builtin;
pub mod parse;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Conversation;
use crate::store::StorageError;

pub use builtin::BuiltinCommands;

/// Outcome of a deterministic command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    /// Text to send back to the user.
    pub message: String,
    /// Whether conversation, session or codebase state changed.
    pub modified: bool,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            modified: false,
        }
    }

    pub fn modified(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            modified: true,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            modified: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handles marker-prefixed messages other than `/command-invoke`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        conversation: &Conversation,
        text: &str,
    ) -> Result<CommandResult, CommandError>;
}
