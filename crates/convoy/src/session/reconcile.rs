//! Turning an assistant chunk stream into outbound chat messages.
//!
//! Two policies, picked by the gateway's [`StreamingMode`]:
//!
//! - `Stream`: every assistant chunk and every formatted tool call is sent as
//!   soon as it arrives, in stream order.
//! - `Batch`: nothing is sent until the stream ends; then the last assistant
//!   chunk is cleaned of tool-indicator sections and sent once.
//!
//! In both modes a result chunk with a resume token is reported back so the
//! session can be updated.

use convoy_gateway_protocol::StreamingMode;
use tracing::debug;

use crate::assistant::{MessageChunk, format_tool_call};

/// Leading glyphs that mark a section as tool narration rather than an answer.
pub const TOOL_INDICATORS: &[&str] = &["🔧", "💭", "📝", "✏️", "🗑️", "📂", "🔍"];

/// Effect of a single chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChunkEffect {
    /// Text to send right now.
    pub send: Option<String>,
    /// New resume token to persist.
    pub token: Option<String>,
}

/// Per-run reconciliation state.
#[derive(Debug)]
pub struct Reconciler {
    mode: StreamingMode,
    last_assistant: Option<String>,
}

impl Reconciler {
    pub fn new(mode: StreamingMode) -> Self {
        Self {
            mode,
            last_assistant: None,
        }
    }

    pub fn accept(&mut self, chunk: MessageChunk) -> ChunkEffect {
        match chunk {
            MessageChunk::Assistant { content } => match self.mode {
                StreamingMode::Stream => ChunkEffect {
                    send: Some(content),
                    token: None,
                },
                StreamingMode::Batch => {
                    self.last_assistant = Some(content);
                    ChunkEffect::default()
                }
            },
            MessageChunk::Tool { name, input } => match self.mode {
                StreamingMode::Stream => ChunkEffect {
                    send: Some(format_tool_call(&name, &input)),
                    token: None,
                },
                StreamingMode::Batch => ChunkEffect::default(),
            },
            MessageChunk::Result { session_id } => ChunkEffect {
                send: None,
                token: session_id,
            },
            MessageChunk::System { content } => {
                debug!(content = %content, "Assistant system chunk");
                ChunkEffect::default()
            }
            MessageChunk::Thinking { content } => {
                debug!(chars = content.len(), "Assistant thinking chunk");
                ChunkEffect::default()
            }
        }
    }

    /// The single batch message, if any. Always `None` in stream mode.
    pub fn finish(self) -> Option<String> {
        match self.mode {
            StreamingMode::Stream => None,
            StreamingMode::Batch => self.last_assistant.map(|last| summarize(&last)),
        }
    }
}

/// Drop tool-indicator sections from a final message.
///
/// Sections are separated by blank lines. If every section is dropped the
/// original text is returned unchanged.
pub fn summarize(text: &str) -> String {
    let kept: Vec<&str> = text
        .split("\n\n")
        .filter(|section| {
            let trimmed = section.trim_start();
            !TOOL_INDICATORS.iter().any(|glyph| trimmed.starts_with(glyph))
        })
        .collect();

    let joined = kept.join("\n\n");
    if joined.trim().is_empty() {
        text.to_string()
    } else {
        joined
    }
}
