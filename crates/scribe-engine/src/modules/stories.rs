//! User stories module

use async_trait::async_trait;
use std::sync::Arc;

use scribe_llm::{ChunkStream, LlmProvider, StreamRequest};

use super::ArtefactModule;
use crate::error::Result;

const CREATE_PROMPT: &str = "You are a meeting user story generator. Based on the meeting conversation provided, generate user stories in standard format.

Rules:
- Use the format: \"As a [role], I want [feature], so that [benefit]\"
- Include acceptance criteria as a checklist under each story
- Prioritise stories mentioned explicitly, then infer from discussion
- Group related stories under epics if there are enough
- Use markdown format";

const UPDATE_PROMPT: &str = "You are a meeting user story updater. You will receive existing user stories and new meeting conversation. Update only the stories affected by the new discussion.

Rules:
- Preserve all existing stories that are still valid
- Modify acceptance criteria if the new conversation refines requirements
- Add new stories only if the conversation introduces new features
- Remove stories only if explicitly cancelled in the conversation
- Keep the standard format: \"As a [role], I want [feature], so that [benefit]\"
- Use markdown format
- Output all stories (existing + updated + new)";

const MAX_TOKENS: u32 = 4096;

/// Generates user stories with acceptance criteria.
pub struct StoriesModule {
    provider: Arc<dyn LlmProvider>,
}

impl StoriesModule {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ArtefactModule for StoriesModule {
    fn key(&self) -> &'static str {
        "stories"
    }

    fn description(&self) -> &'static str {
        "user stories with acceptance criteria"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["user stories", "user-stories"]
    }

    async fn generate(&self, context: &str, current: Option<&str>) -> Result<ChunkStream> {
        let request = match current {
            Some(existing) => StreamRequest::new(
                UPDATE_PROMPT,
                format!(
                    "## Current stories\n{}\n\n## New conversation\n{}",
                    existing, context
                ),
                MAX_TOKENS,
            ),
            None => StreamRequest::new(CREATE_PROMPT, context, MAX_TOKENS),
        };
        Ok(self.provider.stream(request).await?)
    }
}
