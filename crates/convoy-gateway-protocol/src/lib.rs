//! Gateway Protocol types for communication between Convoy and platform gateways.
//!
//! A gateway is the platform-facing half of a chat integration (Telegram, Slack,
//! GitHub issues, an in-process test harness, ...). Convoy only sees normalized
//! messages; the platform specifics stay on the gateway side.
//!
//! # Protocol Overview
//!
//! The protocol is bidirectional:
//!
//! - **Commands** (Convoy → Gateway): send a message, show a typing indicator, shut down
//! - **Events** (Gateway → Convoy): ready, message received, command acknowledgements
//!
//! Both enums serialize as internally tagged JSON (`{"type": "send_message", ...}`)
//! so that out-of-process gateways can speak JSON Lines over stdio.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Commands (Convoy → Gateway)
// ============================================================================

/// Commands sent from Convoy to a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Send a text message to a conversation.
    SendMessage {
        request_id: String,
        conversation_id: String,
        content: String,
    },

    /// Show typing indicator in a conversation.
    SendTyping {
        conversation_id: String,
        /// Duration in seconds (0 = stop typing indicator).
        #[serde(default)]
        duration: u32,
    },

    /// Request graceful shutdown.
    Shutdown,
}

// ============================================================================
// Events (Gateway → Convoy)
// ============================================================================

/// Events sent from a gateway to Convoy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Gateway is ready to receive commands.
    Ready {
        gateway: String,
        version: String,
        #[serde(default)]
        streaming_mode: StreamingMode,
    },

    /// Incoming message from a user.
    MessageReceived(Box<MessageReceivedData>),

    /// Command completed successfully.
    CommandOk { request_id: String },

    /// Command failed.
    CommandError {
        request_id: String,
        code: String,
        message: String,
    },

    /// Gateway-level error (not tied to a specific command).
    Error {
        code: String,
        message: String,
        /// Whether this error is fatal (gateway will shut down).
        #[serde(default)]
        fatal: bool,
    },

    /// Gateway is shutting down.
    Shutdown { reason: String },
}

/// Data for an incoming message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceivedData {
    pub message_id: String,
    /// Platform-specific conversation key (chat, channel, thread or issue id).
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
    /// Trailing context supplied by the platform (e.g. the body of the issue
    /// a comment was posted on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Timestamp when the message was sent (from the platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Sender information for incoming messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// ============================================================================
// Streaming Mode
// ============================================================================

/// How a gateway wants assistant output delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingMode {
    /// Forward every assistant and tool chunk as soon as it is produced.
    #[default]
    Stream,
    /// Buffer the whole run and send one cleaned-up final message.
    Batch,
}

impl std::fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamingMode::Stream => write!(f, "stream"),
            StreamingMode::Batch => write!(f, "batch"),
        }
    }
}
