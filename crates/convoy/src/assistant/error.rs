//! Assistant backend errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("failed to spawn assistant `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("assistant I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("assistant exited with {status} before reporting a result")]
    Exited { status: String },

    #[error("no assistant registered for type `{0}`")]
    UnknownAssistant(String),
}
