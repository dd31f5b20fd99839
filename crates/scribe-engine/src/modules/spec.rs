//! Technical specification module

use async_trait::async_trait;
use std::sync::Arc;

use scribe_llm::{ChunkStream, LlmProvider, StreamRequest};

use super::ArtefactModule;
use crate::error::Result;

const CREATE_PROMPT: &str = "You are a meeting specification generator. Based on the meeting conversation provided, generate a structured technical specification document.

Rules:
- Use markdown format
- Include sections as appropriate: Overview, Requirements, Technical Approach, Constraints, Open Questions
- Only include sections that have relevant content from the conversation
- Be concise but capture all technical details discussed
- Flag any contradictions or unresolved decisions";

const UPDATE_PROMPT: &str = "You are a meeting specification updater. You will receive the current spec and new meeting conversation. Update only the sections affected by the new discussion.

Rules:
- Use markdown format
- Preserve all existing content that is still valid
- Only modify, add, or remove sections directly affected by the new conversation
- Do not rewrite sections that haven't changed
- Flag any contradictions between existing spec and new discussion
- Output the complete updated spec";

const MAX_TOKENS: u32 = 4096;

/// Generates the running technical specification.
pub struct SpecModule {
    provider: Arc<dyn LlmProvider>,
}

impl SpecModule {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ArtefactModule for SpecModule {
    fn key(&self) -> &'static str {
        "spec"
    }

    fn description(&self) -> &'static str {
        "technical specification document"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["specification", "specifications"]
    }

    async fn generate(&self, context: &str, current: Option<&str>) -> Result<ChunkStream> {
        let request = match current {
            Some(existing) => StreamRequest::new(
                UPDATE_PROMPT,
                format!(
                    "## Current spec\n{}\n\n## New conversation\n{}",
                    existing, context
                ),
                MAX_TOKENS,
            ),
            None => StreamRequest::new(CREATE_PROMPT, context, MAX_TOKENS),
        };
        Ok(self.provider.stream(request).await?)
    }
}
