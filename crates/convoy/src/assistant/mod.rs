//! AI coding-assistant backends.
//!
//! A backend takes a prompt, a working directory and an optional resume token
//! and produces a finite, single-pass stream of [`MessageChunk`]s. The stream
//! is consumed by the session orchestrator and never restarted.

mod claude;
mod error;
mod format;
mod registry;

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

pub use claude::{ClaudeCliClient, ClaudeCliConfig};
pub use error::AssistantError;
pub use format::format_tool_call;
pub use registry::AssistantRegistry;

// ============================================================================
// Chunks
// ============================================================================

/// One element of a backend's output stream.
///
/// Order within a stream is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageChunk {
    /// Text the assistant wants the user to read.
    Assistant { content: String },
    /// A tool the assistant invoked.
    Tool {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// End of a run. Carries the resume token when the backend reports one.
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Backend housekeeping (init, status).
    System { content: String },
    /// Extended reasoning.
    Thinking { content: String },
}

impl MessageChunk {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    pub fn tool(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::Tool {
            name: name.into(),
            input,
        }
    }

    pub fn result(session_id: Option<&str>) -> Self {
        Self::Result {
            session_id: session_id.map(str::to_string),
        }
    }
}

/// A boxed stream of assistant output chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, AssistantError>> + Send>>;

// ============================================================================
// Client trait
// ============================================================================

/// An AI coding-assistant backend.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Start a run. `resume` continues a previous backend context.
    async fn query(
        &self,
        prompt: &str,
        cwd: &Path,
        resume: Option<&str>,
    ) -> Result<ChunkStream, AssistantError>;
}
