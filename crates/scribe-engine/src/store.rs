//! Persistence collaborator boundary

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::Result;

/// Persistence collaborator for artefact content.
///
/// The context builder hydrates from this at construction and writes through
/// on every successful generation.
#[async_trait]
pub trait ArtefactStore: Send + Sync {
    /// Load every stored artefact for a project, keyed by artefact key.
    async fn load_artefacts(&self, project_id: &str) -> Result<HashMap<String, String>>;

    /// Persist one artefact's content.
    async fn save_artefact(&self, project_id: &str, key: &str, content: &str) -> Result<()>;

    /// Remove one artefact.
    async fn delete_artefact(&self, project_id: &str, key: &str) -> Result<()>;
}

/// In-memory store for tests and embedding without a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of one artefact, if present.
    pub fn get(&self, project_id: &str, key: &str) -> Option<String> {
        self.inner
            .lock()
            .get(project_id)
            .and_then(|m| m.get(key).cloned())
    }
}

#[async_trait]
impl ArtefactStore for MemoryStore {
    async fn load_artefacts(&self, project_id: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .inner
            .lock()
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_artefact(&self, project_id: &str, key: &str, content: &str) -> Result<()> {
        self.inner
            .lock()
            .entry(project_id.to_string())
            .or_default()
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_artefact(&self, project_id: &str, key: &str) -> Result<()> {
        if let Some(project) = self.inner.lock().get_mut(project_id) {
            project.remove(key);
        }
        Ok(())
    }
}
