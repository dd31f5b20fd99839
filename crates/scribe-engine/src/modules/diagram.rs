//! Diagram module: planning plus per-diagram generation
//!
//! Unlike the text modules this one fans out: a planning call decides which
//! diagrams to draw, then each plan is generated (and later validated)
//! independently.

use std::sync::Arc;

use scribe_llm::{ChunkStream, LlmProvider, StreamRequest};

use super::strip_json_fences;
use crate::error::Result;
use crate::types::{DiagramPlan, DiagramRenderer};

const PLANNING_PROMPT: &str = "You are a technical architect. Analyse the meeting conversation and decide which diagrams would best capture the system being discussed.

Pick 2-4 diagrams. For each, choose the most appropriate type (e.g. sequence diagram, ER diagram, C4 system context, flowchart, wireframe, component diagram, state machine, deployment diagram).

For each diagram, specify the renderer:
- \"mermaid\" for technical diagrams (flowcharts, sequence, ER, C4, state, etc.)
- \"html\" for UI wireframes, mockups, or page layouts

Respond with ONLY a JSON array, no markdown, no explanation:
[{\"type\": \"sequence diagram\", \"focus\": \"brief description of what to show\", \"renderer\": \"mermaid\"}, ...]";

const MERMAID_CREATE_PROMPT: &str = "Generate a Mermaid diagram based on the meeting conversation.

Rules:
- Output ONLY valid Mermaid syntax. No code fences, no markdown, no explanation
- Choose the correct Mermaid diagram syntax for the requested type
- Keep diagrams readable, no more than 15-20 nodes
- Use clear, concise labels
- Do NOT add style, classDef, or any custom styling. The renderer handles theming

Common Mermaid syntax patterns:
  graph TD / graph LR for flowcharts: A[Node] -->|label| B[Node]
  sequenceDiagram: participant A / A->>B: message
  erDiagram: relationships use TABLE_A ||--o{ TABLE_B : label
    Attributes MUST use curly brace blocks, NOT the colon syntax:
    CORRECT: TABLE { string name PK \\n string email }
    WRONG: TABLE : string name PK
  C4Context for C4 diagrams. Mermaid C4 syntax is DIFFERENT from PlantUML C4:
    WRONG (PlantUML, do not use):
      person(u, \"User\")
      container(s, \"System\", \"Tech\")
      u ->> s : uses
    CORRECT (Mermaid, always use this):
      C4Context
        title My System
        Person(u, \"User\", \"Description\")
        System(s, \"My System\", \"Technology\")
        System_Ext(e, \"External System\", \"Description\")
        Rel(u, s, \"Uses\")
        Rel(s, e, \"Calls\")
    Rules: PascalCase only (Person, System, Container, Rel). No arrows (->>). No lowercase keywords.
  stateDiagram-v2 for state machines
  classDiagram for class diagrams";

const MERMAID_UPDATE_PROMPT: &str = "Update an existing Mermaid diagram based on new meeting conversation. You will receive the current diagram and new discussion.

Rules:
- Output ONLY valid Mermaid syntax. No code fences, no markdown, no explanation
- Preserve the existing structure where it is still accurate
- Only add, modify, or remove elements directly affected by the new conversation
- Keep diagrams readable, no more than 15-20 nodes
- Use clear, concise labels
- Do NOT add style, classDef, or any custom styling. The renderer handles theming";

const HTML_CREATE_PROMPT: &str = "Generate a UI wireframe as self-contained HTML and CSS. This is a lo-fi wireframe mockup, not a production UI.

Rules:
- Output a COMPLETE HTML document with embedded CSS in a <style> tag
- Use a clean wireframe aesthetic: light grey backgrounds, thin borders, placeholder text
- Use system fonts only. No external resources, no JavaScript
- Include realistic placeholder content (not lorem ipsum)
- Show the layout, navigation, forms, buttons, and key UI elements discussed
- Keep it simple and readable. This is a wireframe, not a polished design
- Output ONLY the HTML. No code fences, no markdown, no explanation";

const HTML_UPDATE_PROMPT: &str = "Update an existing UI wireframe based on new meeting conversation. You will receive the current HTML wireframe and new discussion.

Rules:
- Output a COMPLETE HTML document with embedded CSS in a <style> tag
- Preserve the existing layout and elements where they are still accurate
- Only modify, add, or remove elements directly affected by the new conversation
- Use system fonts only. No external resources, no JavaScript
- Output ONLY the HTML. No code fences, no markdown, no explanation";

const PLANNING_MAX_TOKENS: u32 = 512;
const MERMAID_MAX_TOKENS: u32 = 2048;
const HTML_MAX_TOKENS: u32 = 8192;

/// Plans and generates the diagram artefact family.
pub struct DiagramModule {
    provider: Arc<dyn LlmProvider>,
}

impl DiagramModule {
    pub const KEY: &'static str = "diagram";

    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn description(&self) -> &'static str {
        "technical diagrams (architecture, ER, sequence, flowcharts, wireframes)"
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        &["diagrams"]
    }

    /// Ask the planner which diagrams to draw. An unparseable or empty
    /// response degrades to a single general flowchart.
    pub async fn plan_diagrams(&self, context: &str, max_plans: usize) -> Result<Vec<DiagramPlan>> {
        let raw = self
            .provider
            .complete(StreamRequest::new(
                PLANNING_PROMPT,
                context,
                PLANNING_MAX_TOKENS,
            ))
            .await?;
        Ok(parse_plans(&raw, max_plans))
    }

    /// Stream one diagram from its plan.
    pub async fn generate_diagram(
        &self,
        context: &str,
        plan: &DiagramPlan,
        current: Option<&str>,
    ) -> Result<ChunkStream> {
        let system_prompt = match (plan.renderer, current.is_some()) {
            (DiagramRenderer::Html, true) => HTML_UPDATE_PROMPT,
            (DiagramRenderer::Html, false) => HTML_CREATE_PROMPT,
            (DiagramRenderer::Mermaid, true) => MERMAID_UPDATE_PROMPT,
            (DiagramRenderer::Mermaid, false) => MERMAID_CREATE_PROMPT,
        };

        let user_content = match current {
            Some(existing) => format!(
                "## Current diagram\n{}\n\n## New conversation\n{}\n\nDiagram type: {}\nFocus: {}",
                existing, context, plan.diagram_type, plan.focus
            ),
            None => format!(
                "{}\n\nDiagram type: {}\nFocus: {}",
                context, plan.diagram_type, plan.focus
            ),
        };

        let max_tokens = match plan.renderer {
            DiagramRenderer::Html => HTML_MAX_TOKENS,
            DiagramRenderer::Mermaid => MERMAID_MAX_TOKENS,
        };

        Ok(self
            .provider
            .stream(StreamRequest::new(system_prompt, user_content, max_tokens))
            .await?)
    }
}

/// The plan used when the planner fails to produce one.
pub fn fallback_plan() -> DiagramPlan {
    DiagramPlan {
        diagram_type: "flowchart".to_string(),
        focus: "general system overview".to_string(),
        renderer: DiagramRenderer::Mermaid,
    }
}

fn parse_plans(raw: &str, max_plans: usize) -> Vec<DiagramPlan> {
    let cleaned = strip_json_fences(raw);
    let entries: Vec<serde_json::Value> = match serde_json::from_str(&cleaned) {
        Ok(entries) => entries,
        Err(_) => {
            tracing::warn!(raw, "unparseable diagram plan, falling back");
            return vec![fallback_plan()];
        }
    };

    let plans: Vec<DiagramPlan> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<DiagramPlan>(entry).ok())
        .filter(|plan| !plan.diagram_type.is_empty() && !plan.focus.is_empty())
        .take(max_plans)
        .collect();

    if plans.is_empty() {
        vec![fallback_plan()]
    } else {
        plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedProvider;
    use scribe_llm::collect_text;

    #[tokio::test]
    async fn test_plan_parses_valid_entries_and_caps_count() {
        let provider = Arc::new(ScriptedProvider::always(
            r#"```json
[{"type": "er diagram", "focus": "data model", "renderer": "mermaid"},
 {"type": "wireframe", "focus": "dashboard", "renderer": "html"},
 {"type": "sequence", "focus": "auth flow", "renderer": "mermaid"}]
```"#,
        ));
        let module = DiagramModule::new(provider);

        let plans = module.plan_diagrams("context", 2).await.unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].diagram_type, "er diagram");
        assert_eq!(plans[1].renderer, DiagramRenderer::Html);
    }

    #[tokio::test]
    async fn test_plan_skips_malformed_entries() {
        let provider = Arc::new(ScriptedProvider::always(
            r#"[{"type": "er", "focus": "data", "renderer": "mermaid"},
                {"type": "bad", "renderer": "svg"},
                {"focus": "no type", "renderer": "html"}]"#,
        ));
        let module = DiagramModule::new(provider);

        let plans = module.plan_diagrams("context", 4).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].diagram_type, "er");
    }

    #[tokio::test]
    async fn test_plan_falls_back_on_garbage() {
        let provider = Arc::new(ScriptedProvider::always("I think a flowchart would be nice"));
        let module = DiagramModule::new(provider);

        let plans = module.plan_diagrams("context", 4).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].diagram_type, "flowchart");
        assert_eq!(plans[0].renderer, DiagramRenderer::Mermaid);
    }

    #[tokio::test]
    async fn test_plan_falls_back_on_empty_array() {
        let provider = Arc::new(ScriptedProvider::always("[]"));
        let module = DiagramModule::new(provider);

        let plans = module.plan_diagrams("context", 4).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].diagram_type, "flowchart");
    }

    #[tokio::test]
    async fn test_generate_selects_prompt_and_budget_by_renderer() {
        let provider = Arc::new(ScriptedProvider::always("graph TD\n  A --> B"));
        let module = DiagramModule::new(provider.clone());

        let mermaid_plan = DiagramPlan {
            diagram_type: "flowchart".into(),
            focus: "overview".into(),
            renderer: DiagramRenderer::Mermaid,
        };
        let html_plan = DiagramPlan {
            diagram_type: "wireframe".into(),
            focus: "dashboard".into(),
            renderer: DiagramRenderer::Html,
        };

        collect_text(module.generate_diagram("talk", &mermaid_plan, None).await.unwrap())
            .await
            .unwrap();
        collect_text(
            module
                .generate_diagram("talk", &html_plan, Some("<html></html>"))
                .await
                .unwrap(),
        )
        .await
        .unwrap();

        let requests = provider.requests();
        assert!(requests[0].system_prompt.contains("Generate a Mermaid diagram"));
        assert_eq!(requests[0].max_tokens, MERMAID_MAX_TOKENS);
        assert!(requests[0].user_content.contains("Diagram type: flowchart"));
        assert!(requests[1].system_prompt.contains("Update an existing UI wireframe"));
        assert_eq!(requests[1].max_tokens, HTML_MAX_TOKENS);
        assert!(requests[1].user_content.contains("## Current diagram"));
    }
}
