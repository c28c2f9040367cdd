//! Errors raised while handling one inbound message.

use std::time::Duration;

use thiserror::Error;

use crate::assistant::AssistantError;
use crate::command::CommandError;
use crate::store::StorageError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A problem the user can fix. The text is sent back verbatim.
    #[error("{0}")]
    User(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error("assistant stream timed out after {0:?}")]
    StreamTimeout(Duration),
}

impl OrchestratorError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }
}
