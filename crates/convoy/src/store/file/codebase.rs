//! File-based codebase storage.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::model::Codebase;
use crate::store::codebase::CodebaseStore;
use crate::store::error::StorageResult;

use super::{read_yaml, safe_segment, write_yaml, yaml_files};

/// File-based implementation of `CodebaseStore`.
#[derive(Debug, Clone)]
pub struct FileCodebaseStore {
    codebases_dir: PathBuf,
}

impl FileCodebaseStore {
    pub fn new(codebases_dir: impl Into<PathBuf>) -> Self {
        Self {
            codebases_dir: codebases_dir.into(),
        }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.codebases_dir.join(format!("{}.yaml", safe_segment(id)))
    }
}

#[async_trait]
impl CodebaseStore for FileCodebaseStore {
    async fn get(&self, id: &str) -> StorageResult<Option<Codebase>> {
        read_yaml(&self.path(id)).await
    }

    async fn list(&self) -> StorageResult<Vec<Codebase>> {
        let mut codebases = Vec::new();
        for path in yaml_files(&self.codebases_dir).await? {
            if let Some(codebase) = read_yaml::<Codebase>(&path).await? {
                codebases.push(codebase);
            }
        }
        codebases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(codebases)
    }

    async fn save(&self, codebase: &Codebase) -> StorageResult<()> {
        write_yaml(&self.path(&codebase.id), codebase).await
    }
}
