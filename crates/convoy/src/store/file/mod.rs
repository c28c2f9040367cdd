//! File-based storage implementations.
//!
//! Every record is one YAML document. All writes use atomic operations
//! (temp file + rename) to prevent corruption.
//!
//! Directory structure:
//! ```text
//! {data_dir}/
//!   conversations/{platform}/{sha256(conversation_key)}.yaml
//!   sessions/{conversation_id}/{session_id}.yaml
//!   codebases/{codebase_id}.yaml
//! ```

mod codebase;
mod conversation;
mod session;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;

use crate::store::error::{StorageError, StorageResult};

pub use codebase::FileCodebaseStore;
pub use conversation::FileConversationStore;
pub use session::FileSessionStore;

/// Read a YAML document. A missing file is `Ok(None)`.
async fn read_yaml<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::file_io(path, e)),
    };

    let value = serde_saphyr::from_str(&contents)
        .map_err(|e| StorageError::file_deserialization(path, e.to_string()))?;
    Ok(Some(value))
}

/// Write a YAML document atomically, creating parent directories.
async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::file_io(parent, e))?;
    }

    let yaml =
        serde_saphyr::to_string(value).map_err(|e| StorageError::serialization(e.to_string()))?;

    // Unique temp name: two writers of the same codebase must not share one.
    let temp_path = path.with_extension(format!("yaml.{}.tmp", ulid::Ulid::new()));
    fs::write(&temp_path, yaml.as_bytes())
        .await
        .map_err(|e| StorageError::file_io(&temp_path, e))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| StorageError::file_io(path, e))?;

    Ok(())
}

/// Paths of all `*.yaml` files directly inside `dir`. A missing directory is empty.
async fn yaml_files(dir: &Path) -> StorageResult<Vec<std::path::PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::file_io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::file_io(dir, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "yaml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Restrict a path segment to characters that are safe on every filesystem.
fn safe_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
