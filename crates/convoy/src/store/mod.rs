//! Persistence for conversations, sessions and codebases.
//!
//! The traits here are the only storage surface the rest of the crate sees.
//! `file` holds the YAML-on-disk implementations used by `convoy serve`.

mod codebase;
mod conversation;
pub mod error;
pub mod file;
mod session;

pub use codebase::CodebaseStore;
pub use conversation::ConversationStore;
pub use error::{StorageError, StorageResult};
pub use session::SessionStore;
