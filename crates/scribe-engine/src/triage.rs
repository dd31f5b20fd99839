//! Triage classifier
//!
//! A cheap model call that gates generation: given the new batch and the
//! known artefact keys, which artefacts does this conversation touch?
//! Classification failures fail OPEN to the full known set. A wrongly
//! regenerated artefact converges to the same content; a wrongly skipped
//! one silently goes stale.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use scribe_llm::{LlmProvider, StreamRequest};

use crate::modules::{ModuleRegistry, strip_json_fences};
use crate::types::{DIAGRAM_DELETE_PREFIX, DIAGRAM_NEW_PREFIX};

const MAX_TOKENS: u32 = 256;

static DIAGRAM_KIND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Decide which artefact keys the new batch touches.
///
/// Returns canonical keys from the known set, plus any well-formed
/// `diagram:new:<kind>` / `diagram:delete:<kind>` directives. On provider
/// failure or unparseable output, returns the full known set.
pub async fn classify(
    provider: &dyn LlmProvider,
    batch_text: &str,
    registry: &ModuleRegistry,
    known_diagram_keys: &[String],
) -> Vec<String> {
    let known: Vec<String> = registry
        .text_keys()
        .into_iter()
        .chain(known_diagram_keys.iter().cloned())
        .collect();

    let user_content = format!(
        "Available artefact types: {}\n\nNew conversation:\n{}",
        serde_json::to_string(&known).unwrap_or_default(),
        batch_text
    );
    let request = StreamRequest::new(
        build_triage_prompt(&registry.descriptions()),
        user_content,
        MAX_TOKENS,
    );

    let raw = match provider.complete(request).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("triage call failed, running all generators: {}", e);
            return known;
        }
    };

    match parse_selection(&raw, registry, &known) {
        Some(selected) => selected,
        None => {
            tracing::warn!(raw, "unparseable triage response, running all generators");
            known
        }
    }
}

/// Normalise raw classifier output against the known set. `None` means the
/// payload was not a JSON array of strings.
fn parse_selection(raw: &str, registry: &ModuleRegistry, known: &[String]) -> Option<Vec<String>> {
    let cleaned = strip_json_fences(raw);
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&cleaned).ok()?;

    let aliases = registry.alias_map();
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for value in parsed {
        let Some(entry) = value.as_str() else {
            continue;
        };
        let entry = entry.trim();

        let canonical = if let Some(canonical) = aliases.get(entry) {
            Some(canonical.clone())
        } else if known.iter().any(|k| k == entry) {
            Some(entry.to_string())
        } else if is_diagram_directive(entry) {
            Some(entry.to_string())
        } else {
            tracing::debug!(entry, "dropping unknown triage key");
            None
        };

        if let Some(key) = canonical {
            if seen.insert(key.clone()) {
                selected.push(key);
            }
        }
    }

    Some(selected)
}

/// `diagram:new:<kind>` / `diagram:delete:<kind>` with a well-formed kind.
fn is_diagram_directive(key: &str) -> bool {
    let kind = key
        .strip_prefix(DIAGRAM_NEW_PREFIX)
        .or_else(|| key.strip_prefix(DIAGRAM_DELETE_PREFIX));
    match kind {
        Some(kind) => DIAGRAM_KIND.is_match(kind),
        None => false,
    }
}

fn build_triage_prompt(descriptions: &[(String, String)]) -> String {
    let type_lines = descriptions
        .iter()
        .map(|(key, desc)| format!("- \"{}\" = {}", key, desc))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a triage classifier for a meeting artefact generator. Given new meeting conversation and a list of artefact types, decide which artefacts need updating.

Rules:
- Only select artefacts where the new conversation is directly relevant
- If the conversation is small talk, greetings, or filler ("yeah", "makes sense", "ok"), return an empty array
{type_lines}
- For existing diagram subtypes (e.g. "diagram:wireframe"), return the exact key as listed

Existing diagram updates:
- Only return an existing diagram subtype (e.g. "diagram:sequence") when the conversation contains new information relevant to THAT SPECIFIC diagram type
- Do NOT return an existing diagram for update just because someone requested a different diagram type. That is a new diagram, not an update

New diagram creation:
You may suggest creating a NEW diagram when the conversation contains enough concrete detail that a diagram would genuinely aid understanding. Return "diagram:new:{{type}}" where {{type}} is a short lowercase hyphenated name (e.g. "diagram:new:er", "diagram:new:sequence", "diagram:new:flowchart", "diagram:new:wireframe").
- Be conservative. Only suggest a diagram when there is substantial information to populate it (entities and relationships for ER, clear steps for sequence/flowchart, UI elements for wireframe)
- Prefer fewer diagrams over many. One well-justified diagram is better than three speculative ones
- Do not suggest a diagram type that already exists in the available types list
- Also create diagrams when someone explicitly asks for one (e.g. "I'd like a C4 diagram" means "diagram:new:c4")

Diagram deletion:
Return "diagram:delete:{{type}}" when someone explicitly asks to remove or delete a specific diagram (e.g. "remove the sequence diagram" means "diagram:delete:sequence", "delete the ER diagram" means "diagram:delete:er").
- Only delete when there is a clear, explicit request. Never infer deletion from context
- The {{type}} must match an existing diagram subtype from the available types list

Respond with ONLY a JSON array of artefact type strings. No markdown, no explanation.
Examples: ["spec", "diagram:wireframe"] or ["stories"] or ["diagram:new:er"] or ["diagram:delete:sequence"] or []"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{DiagramModule, ModuleRegistry, SpecModule, StoriesModule};
    use crate::testutil::ScriptedProvider;
    use std::sync::Arc;

    fn registry() -> ModuleRegistry {
        let provider = Arc::new(ScriptedProvider::always("unused"));
        ModuleRegistry::new(
            vec![
                Arc::new(SpecModule::new(provider.clone())),
                Arc::new(StoriesModule::new(provider.clone())),
            ],
            DiagramModule::new(provider),
        )
    }

    fn keys(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_selects_known_keys() {
        let provider = ScriptedProvider::always(r#"["spec", "diagram:er"]"#);
        let selected = classify(&provider, "batch", &registry(), &keys(&["diagram:er"])).await;
        assert_eq!(selected, keys(&["spec", "diagram:er"]));
    }

    #[tokio::test]
    async fn test_empty_array_runs_nothing() {
        let provider = ScriptedProvider::always("[]");
        let selected = classify(&provider, "yeah ok", &registry(), &[]).await;
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn test_fails_open_on_garbage() {
        let provider = ScriptedProvider::always("definitely the spec needs an update");
        let selected = classify(&provider, "batch", &registry(), &keys(&["diagram:er"])).await;
        assert_eq!(selected, keys(&["spec", "stories", "diagram:er"]));
    }

    #[tokio::test]
    async fn test_fails_open_on_provider_error() {
        let provider = ScriptedProvider::always_failing();
        let selected = classify(&provider, "batch", &registry(), &[]).await;
        assert_eq!(selected, keys(&["spec", "stories"]));
    }

    #[tokio::test]
    async fn test_fails_open_on_non_array_json() {
        let provider = ScriptedProvider::always(r#"{"spec": true}"#);
        let selected = classify(&provider, "batch", &registry(), &[]).await;
        assert_eq!(selected, keys(&["spec", "stories"]));
    }

    #[tokio::test]
    async fn test_normalises_aliases() {
        let provider = ScriptedProvider::always(r#"["specification", "user stories"]"#);
        let selected = classify(&provider, "batch", &registry(), &[]).await;
        assert_eq!(selected, keys(&["spec", "stories"]));
    }

    #[tokio::test]
    async fn test_dedupes_preserving_order() {
        let provider = ScriptedProvider::always(r#"["stories", "spec", "user stories"]"#);
        let selected = classify(&provider, "batch", &registry(), &[]).await;
        assert_eq!(selected, keys(&["stories", "spec"]));
    }

    #[tokio::test]
    async fn test_drops_unknown_keys_and_nonstrings() {
        let provider = ScriptedProvider::always(r#"["spec", "wiki", 42, "diagram:unknown"]"#);
        let selected = classify(&provider, "batch", &registry(), &[]).await;
        assert_eq!(selected, keys(&["spec"]));
    }

    #[tokio::test]
    async fn test_accepts_wellformed_directives_only() {
        let provider = ScriptedProvider::always(
            r#"["diagram:new:er", "diagram:delete:sequence", "diagram:new:Bad Kind", "diagram:new:"]"#,
        );
        let selected = classify(&provider, "batch", &registry(), &keys(&["diagram:sequence"])).await;
        assert_eq!(selected, keys(&["diagram:new:er", "diagram:delete:sequence"]));
    }

    #[tokio::test]
    async fn test_triage_fenced_json_accepted() {
        let provider = ScriptedProvider::always("```json\n[\"spec\"]\n```");
        let selected = classify(&provider, "batch", &registry(), &[]).await;
        assert_eq!(selected, keys(&["spec"]));
    }
}
