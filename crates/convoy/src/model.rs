//! Persistent records: conversations, sessions and codebases.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Conversation
// ============================================================================

/// One chat thread on one platform, identified by (platform, key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Gateway name the conversation lives on (e.g. `test`, `telegram`).
    pub platform: String,
    /// Platform-specific chat, channel or thread id.
    pub conversation_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codebase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    pub assistant_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        platform: impl Into<String>,
        conversation_key: impl Into<String>,
        assistant_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            platform: platform.into(),
            conversation_key: conversation_key.into(),
            codebase_id: None,
            cwd: None,
            assistant_type: assistant_type.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Session
// ============================================================================

/// One continuous backend context within a conversation.
///
/// At most one session per conversation is active. Sessions are deactivated,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codebase_id: Option<String>,
    pub assistant_type: String,
    /// Resume token reported by the backend. Absent until the first result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_session_id: Option<String>,
    /// Name of the last command invoked in this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        conversation_id: impl Into<String>,
        codebase_id: Option<String>,
        assistant_type: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            conversation_id: conversation_id.into(),
            codebase_id,
            assistant_type: assistant_type.into(),
            assistant_session_id: None,
            last_command: None,
            metadata: BTreeMap::new(),
            active: true,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.ended_at = Some(Utc::now());
    }
}

// ============================================================================
// Codebase
// ============================================================================

/// A repository the assistant works in, plus its named prompt commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codebase {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    pub default_cwd: PathBuf,
    #[serde(default)]
    pub commands: BTreeMap<String, CommandDef>,
    pub created_at: DateTime<Utc>,
}

impl Codebase {
    pub fn new(name: impl Into<String>, default_cwd: impl Into<PathBuf>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name: name.into(),
            repository_url: None,
            default_cwd: default_cwd.into(),
            commands: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// A prompt template file registered under a command name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDef {
    /// Path relative to the working directory.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CommandDef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: None,
        }
    }
}
