//! Assistant lookup by type name.

use std::collections::HashMap;
use std::sync::Arc;

use super::{AssistantClient, AssistantError};

/// Maps assistant type names (as stored on conversations) to clients.
#[derive(Clone, Default)]
pub struct AssistantRegistry {
    clients: HashMap<String, Arc<dyn AssistantClient>>,
}

impl AssistantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn AssistantClient>) {
        self.clients.insert(name.into(), client);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AssistantClient>, AssistantError> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| AssistantError::UnknownAssistant(name.to_string()))
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for AssistantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantRegistry")
            .field("clients", &self.names())
            .finish()
    }
}
