//! OpenAI-compatible Chat Completions provider (text streaming only)
//!
//! Works against any endpoint speaking the Chat Completions SSE dialect
//! (OpenAI, Groq, local inference servers).

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    provider::LlmProvider,
    stream::ChunkStream,
    types::StreamRequest,
};

/// OpenAI-compatible API client
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    /// Create a provider against an explicit endpoint and model
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Create an OpenAI provider from the `OPENAI_API_KEY` environment variable
    pub fn openai_from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key, "https://api.openai.com/v1", "gpt-4o"))
    }

    /// Create a Groq provider from the `GROQ_API_KEY` environment variable
    pub fn groq_from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        let model = std::env::var("GROQ_MODEL")
            .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());
        Ok(Self::new(api_key, "https://api.groq.com/openai/v1", model))
    }

    fn build_request(&self, request: &StreamRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            stream: true,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_content.clone(),
                },
            ],
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn stream(&self, request: StreamRequest) -> Result<ChunkStream> {
        let body = self.build_request(&request);
        let url = format!("{}/chat/completions", self.base_url);

        let request_builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<String>> {
    stream! {
        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        event_source.close();
                        return;
                    }
                    match serde_json::from_str::<ChatChunk>(&message.data) {
                        Ok(chunk) => {
                            if let Some(delta) = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                            {
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("unparseable chat chunk: {}", e);
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    return;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    event_source.close();
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    stream: bool,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    delta: ChatDelta,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}
