//! File-based session storage.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Session;
use crate::store::error::StorageResult;
use crate::store::session::SessionStore;

use super::{read_yaml, safe_segment, write_yaml, yaml_files};

/// Name of the per-conversation index naming the active session. It has no
/// `.yaml` extension so session listings skip it.
const ACTIVE_INDEX: &str = "active.idx";

/// Contents of the active-session index.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ActiveIndex {
    session_id: Option<String>,
}

/// File-based implementation of `SessionStore`.
///
/// Each conversation has a directory holding one YAML file per session, plus
/// an index naming the active one so lookups do not scan old sessions.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
}

impl FileSessionStore {
    /// The sessions directory is created when the first session is stored.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    fn conversation_dir(&self, conversation_id: &str) -> PathBuf {
        self.sessions_dir.join(safe_segment(conversation_id))
    }

    fn session_path(&self, conversation_id: &str, session_id: &str) -> PathBuf {
        self.conversation_dir(conversation_id)
            .join(format!("{}.yaml", safe_segment(session_id)))
    }

    fn index_path(&self, conversation_id: &str) -> PathBuf {
        self.conversation_dir(conversation_id).join(ACTIVE_INDEX)
    }

    /// Full scan, used when the index is missing or stale.
    async fn scan_active(&self, conversation_id: &str) -> StorageResult<Option<Session>> {
        Ok(self
            .list(conversation_id)
            .await?
            .into_iter()
            .filter(|s| s.active)
            .max_by_key(|s| s.started_at))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn active(&self, conversation_id: &str) -> StorageResult<Option<Session>> {
        let index = read_yaml::<ActiveIndex>(&self.index_path(conversation_id)).await?;
        match index {
            Some(ActiveIndex { session_id: None }) => Ok(None),
            Some(ActiveIndex {
                session_id: Some(id),
            }) => match read_yaml::<Session>(&self.session_path(conversation_id, &id)).await? {
                Some(session) if session.active => Ok(Some(session)),
                _ => self.scan_active(conversation_id).await,
            },
            None => self.scan_active(conversation_id).await,
        }
    }

    async fn list(&self, conversation_id: &str) -> StorageResult<Vec<Session>> {
        let mut sessions = Vec::new();
        for path in yaml_files(&self.conversation_dir(conversation_id)).await? {
            if let Some(session) = read_yaml::<Session>(&path).await? {
                sessions.push(session);
            }
        }
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }

    async fn save(&self, session: &Session) -> StorageResult<()> {
        let path = self.session_path(&session.conversation_id, &session.id);
        write_yaml(&path, session).await?;

        let index_path = self.index_path(&session.conversation_id);
        let index = if session.active {
            Some(ActiveIndex {
                session_id: Some(session.id.clone()),
            })
        } else {
            // Only clear the index if it points at this session.
            match read_yaml::<ActiveIndex>(&index_path).await? {
                Some(ActiveIndex {
                    session_id: Some(id),
                }) if id == session.id => Some(ActiveIndex::default()),
                _ => None,
            }
        };
        match index {
            Some(index) => write_yaml(&index_path, &index).await,
            None => Ok(()),
        }
    }
}
