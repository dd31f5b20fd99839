//! Request types shared by all providers

use serde::{Deserialize, Serialize};

/// A single streaming generation request.
///
/// The engine always sends one system prompt and one user document; there is
/// no multi-turn conversation at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    /// System prompt
    pub system_prompt: String,
    /// User content (the composed prompt context)
    pub user_content: String,
    /// Maximum output size in tokens
    pub max_tokens: u32,
}

impl StreamRequest {
    /// Create a request with the given prompts and output budget.
    pub fn new(
        system_prompt: impl Into<String>,
        user_content: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_content: user_content.into(),
            max_tokens,
        }
    }
}
