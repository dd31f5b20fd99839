//! Mock providers shared across test modules.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use scribe_llm::{ChunkStream, LlmProvider, StreamRequest, chunk_stream_from_text};

use crate::error::{Error, Result};
use crate::store::ArtefactStore;

/// Provider that gives every request the same scripted reply and records
/// every request it saw.
pub struct ScriptedProvider {
    reply: Option<String>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedProvider {
    /// Reply to every request with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request.
    pub fn always_failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream(&self, request: StreamRequest) -> scribe_llm::Result<ChunkStream> {
        self.requests.lock().push(request);
        match &self.reply {
            Some(text) => Ok(chunk_stream_from_text(text)),
            None => Err(scribe_llm::Error::api("scripted", "scripted failure")),
        }
    }
}

/// Provider whose streams never yield anything, for timeout paths.
pub struct HangingProvider;

#[async_trait]
impl LlmProvider for HangingProvider {
    async fn stream(&self, _request: StreamRequest) -> scribe_llm::Result<ChunkStream> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// Provider that dispatches on the system prompt, so one scheduler can be
/// wired with distinct behaviour per generator.
pub struct RoutingProvider {
    routes: Vec<(String, Arc<dyn LlmProvider>)>,
    default: Arc<dyn LlmProvider>,
}

impl RoutingProvider {
    pub fn new(default: Arc<dyn LlmProvider>) -> Self {
        Self {
            routes: Vec::new(),
            default,
        }
    }

    /// Route requests whose system prompt contains `needle` to `provider`.
    pub fn route(mut self, needle: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.routes.push((needle.into(), provider));
        self
    }
}

/// Store that hydrates empty and refuses every write, for persistence
/// failure paths.
pub struct FailingStore;

#[async_trait]
impl ArtefactStore for FailingStore {
    async fn load_artefacts(&self, _project_id: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn save_artefact(&self, _project_id: &str, _key: &str, _content: &str) -> Result<()> {
        Err(Error::Store("write refused".into()))
    }

    async fn delete_artefact(&self, _project_id: &str, _key: &str) -> Result<()> {
        Err(Error::Store("delete refused".into()))
    }
}

#[async_trait]
impl LlmProvider for RoutingProvider {
    async fn stream(&self, request: StreamRequest) -> scribe_llm::Result<ChunkStream> {
        let provider = self
            .routes
            .iter()
            .find(|(needle, _)| request.system_prompt.contains(needle.as_str()))
            .map(|(_, p)| p.clone())
            .unwrap_or_else(|| self.default.clone());
        provider.stream(request).await
    }
}
