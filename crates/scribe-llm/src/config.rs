//! Provider selection configuration
//!
//! Which provider backs which generator role ("spec", "stories", "diagram",
//! "triage", "summary") is configuration, not code. Providers are created
//! lazily and cached per kind.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{Error, Result},
    provider::{LlmProvider, LoggingProvider},
    providers::{AnthropicProvider, OpenAiCompatProvider},
};

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Groq,
}

/// Provider selection: a default plus per-generator overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when no override matches
    pub default_provider: ProviderKind,
    /// Per-generator-role overrides, keyed by role name
    pub generators: HashMap<String, ProviderKind>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::Anthropic,
            generators: HashMap::new(),
        }
    }
}

impl LlmConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Load from the environment: `SCRIBE_LLM_PROVIDER` selects the default.
    pub fn from_env() -> Self {
        let default_provider = match std::env::var("SCRIBE_LLM_PROVIDER").as_deref() {
            Ok("openai") => ProviderKind::OpenAi,
            Ok("groq") => ProviderKind::Groq,
            _ => ProviderKind::Anthropic,
        };
        Self {
            default_provider,
            generators: HashMap::new(),
        }
    }

    /// The provider kind backing a generator role.
    pub fn kind_for(&self, generator: &str) -> ProviderKind {
        self.generators
            .get(generator)
            .copied()
            .unwrap_or(self.default_provider)
    }
}

/// Creates and caches provider instances per kind.
pub struct ProviderFactory {
    config: LlmConfig,
    cache: Mutex<HashMap<ProviderKind, Arc<dyn LlmProvider>>>,
}

impl ProviderFactory {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The provider backing a generator role, wrapped for request logging.
    pub fn provider_for(&self, generator: &str) -> Result<Arc<dyn LlmProvider>> {
        let kind = self.config.kind_for(generator);
        tracing::debug!(generator, ?kind, "provider selected");

        let mut cache = self.cache.lock();
        if let Some(existing) = cache.get(&kind) {
            return Ok(Arc::clone(existing));
        }

        let inner: Arc<dyn LlmProvider> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_env()?),
            ProviderKind::OpenAi => Arc::new(OpenAiCompatProvider::openai_from_env()?),
            ProviderKind::Groq => Arc::new(OpenAiCompatProvider::groq_from_env()?),
        };
        let provider: Arc<dyn LlmProvider> =
            Arc::new(LoggingProvider::new(inner, format!("{:?}", kind)));

        cache.insert(kind, Arc::clone(&provider));
        Ok(provider)
    }
}
