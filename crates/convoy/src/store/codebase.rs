//! Codebase storage trait.

use async_trait::async_trait;

use crate::model::Codebase;

use super::error::StorageResult;

/// Storage interface for codebase records and their command maps.
#[async_trait]
pub trait CodebaseStore: Send + Sync {
    async fn get(&self, id: &str) -> StorageResult<Option<Codebase>>;

    /// All registered codebases, ordered by name.
    async fn list(&self) -> StorageResult<Vec<Codebase>>;

    /// Persist a codebase, replacing any previous version.
    async fn save(&self, codebase: &Codebase) -> StorageResult<()>;

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Codebase>> {
        Ok(self.list().await?.into_iter().find(|c| c.name == name))
    }
}
