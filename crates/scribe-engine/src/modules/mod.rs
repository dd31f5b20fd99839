//! Artefact generator modules
//!
//! Each module owns one artefact type: its key, the aliases the classifier
//! may return for it, and how to prompt for a fresh or updated rendition.
//! Text modules share the [`ArtefactModule`] trait; the diagram module has a
//! wider surface (planning, per-plan generation) and its own type.

mod diagram;
mod spec;
mod stories;

pub use diagram::{DiagramModule, fallback_plan};
pub use spec::SpecModule;
pub use stories::StoriesModule;

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use scribe_llm::{ChunkStream, ProviderFactory};

use crate::error::Result;

/// A generator for one text artefact type.
#[async_trait]
pub trait ArtefactModule: Send + Sync {
    /// Canonical artefact key.
    fn key(&self) -> &'static str;

    /// One-line description shown to the triage classifier.
    fn description(&self) -> &'static str;

    /// Alternate names the classifier may return instead of the key.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Stream a fresh rendition (no `current`) or an updated one.
    async fn generate(&self, context: &str, current: Option<&str>) -> Result<ChunkStream>;
}

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:json)?\s*").unwrap());

/// Remove markdown code fences a model wrapped around a JSON payload.
pub(crate) fn strip_json_fences(raw: &str) -> String {
    JSON_FENCE.replace_all(raw, "").trim().to_string()
}

/// The set of registered modules: text modules plus the diagram module.
pub struct ModuleRegistry {
    text: Vec<Arc<dyn ArtefactModule>>,
    diagram: DiagramModule,
}

impl ModuleRegistry {
    pub fn new(text: Vec<Arc<dyn ArtefactModule>>, diagram: DiagramModule) -> Self {
        Self { text, diagram }
    }

    /// The standard module set (spec, stories, diagram), each wired to the
    /// provider configured for its generator role.
    pub fn standard(factory: &ProviderFactory) -> Result<Self> {
        Ok(Self::new(
            vec![
                Arc::new(SpecModule::new(factory.provider_for("spec")?)),
                Arc::new(StoriesModule::new(factory.provider_for("stories")?)),
            ],
            DiagramModule::new(factory.provider_for("diagram")?),
        ))
    }

    pub fn text_module(&self, key: &str) -> Option<&Arc<dyn ArtefactModule>> {
        self.text.iter().find(|m| m.key() == key)
    }

    pub fn text_keys(&self) -> Vec<String> {
        self.text.iter().map(|m| m.key().to_string()).collect()
    }

    pub fn diagram(&self) -> &DiagramModule {
        &self.diagram
    }

    /// `(key, description)` pairs for the triage prompt, diagram included.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .text
            .iter()
            .map(|m| (m.key().to_string(), m.description().to_string()))
            .collect();
        out.push((
            DiagramModule::KEY.to_string(),
            self.diagram.description().to_string(),
        ));
        out
    }

    /// Alias (and canonical name) to canonical key, for normalising
    /// classifier output.
    pub fn alias_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for module in &self.text {
            map.insert(module.key().to_string(), module.key().to_string());
            for alias in module.aliases() {
                map.insert((*alias).to_string(), module.key().to_string());
            }
        }
        map.insert(DiagramModule::KEY.to_string(), DiagramModule::KEY.to_string());
        for alias in self.diagram.aliases() {
            map.insert((*alias).to_string(), DiagramModule::KEY.to_string());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedProvider;
    use scribe_llm::collect_text;

    fn registry() -> ModuleRegistry {
        let provider = Arc::new(ScriptedProvider::always("out"));
        ModuleRegistry::new(
            vec![
                Arc::new(SpecModule::new(provider.clone())),
                Arc::new(StoriesModule::new(provider.clone())),
            ],
            DiagramModule::new(provider),
        )
    }

    #[test]
    fn test_text_keys_and_lookup() {
        let registry = registry();
        assert_eq!(registry.text_keys(), vec!["spec", "stories"]);
        assert!(registry.text_module("spec").is_some());
        assert!(registry.text_module("diagram").is_none());
    }

    #[test]
    fn test_alias_map_covers_aliases_and_canonical_names() {
        let map = registry().alias_map();
        assert_eq!(map.get("spec").map(String::as_str), Some("spec"));
        assert_eq!(map.get("specification").map(String::as_str), Some("spec"));
        assert_eq!(map.get("user stories").map(String::as_str), Some("stories"));
        assert_eq!(map.get("diagrams").map(String::as_str), Some("diagram"));
        assert!(!map.contains_key("wiki"));
    }

    #[test]
    fn test_descriptions_include_diagram_module() {
        let descriptions = registry().descriptions();
        assert!(descriptions.iter().any(|(k, _)| k == "diagram"));
        assert_eq!(descriptions.len(), 3);
    }

    #[test]
    fn test_strip_json_fences() {
        assert_eq!(strip_json_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_json_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_json_fences("[1, 2]"), "[1, 2]");
    }

    #[tokio::test]
    async fn test_spec_module_create_vs_update_prompts() {
        let provider = Arc::new(ScriptedProvider::always("# Spec"));
        let module = SpecModule::new(provider.clone());

        let stream = module.generate("we talked", None).await.unwrap();
        assert_eq!(collect_text(stream).await.unwrap(), "# Spec");

        let stream = module
            .generate("more talk", Some("# Existing"))
            .await
            .unwrap();
        collect_text(stream).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].system_prompt.contains("specification generator"));
        assert_eq!(requests[0].user_content, "we talked");
        assert!(requests[1].system_prompt.contains("specification updater"));
        assert!(requests[1].user_content.contains("## Current spec"));
        assert!(requests[1].user_content.contains("# Existing"));
        assert!(requests[1].user_content.contains("## New conversation"));
    }
}
