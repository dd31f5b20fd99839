//! Anthropic Messages API provider (text streaming only)

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

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Override the model id
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the base URL (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(&self, request: &StreamRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            stream: true,
            system: request.system_prompt.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.user_content.clone(),
            }],
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn stream(&self, request: StreamRequest) -> Result<ChunkStream> {
        let body = self.build_request(&request);
        let url = format!("{}/v1/messages", self.base_url);

        let request_builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .header("anthropic-version", "2023-06-01")
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
                    match message.event.as_str() {
                        "content_block_delta" => {
                            if let Ok(data) =
                                serde_json::from_str::<ContentBlockDeltaEvent>(&message.data)
                            {
                                if data.delta.delta_type == "text_delta" {
                                    if let Some(text) = data.delta.text {
                                        yield Ok(text);
                                    }
                                }
                            }
                        }
                        "message_stop" => {
                            event_source.close();
                            return;
                        }
                        "error" => {
                            let err = serde_json::from_str::<ErrorEvent>(&message.data)
                                .map(|e| Error::api(e.error.error_type, e.error.message))
                                .unwrap_or_else(|_| Error::Sse(message.data.clone()));
                            yield Err(err);
                            event_source.close();
                            return;
                        }
                        _ => {}
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
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    stream: bool,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDeltaEvent {
    delta: ContentDelta,
}

#[derive(Debug, Deserialize)]
struct ContentDelta {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_shape() {
        let provider = AnthropicProvider::new("key").with_model("claude-test");
        let req = provider.build_request(&StreamRequest::new("sys", "hello", 256));
        assert_eq!(req.model, "claude-test");
        assert_eq!(req.max_tokens, 256);
        assert!(req.stream);
        assert_eq!(req.system, "sys");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.messages[0].content, "hello");
    }

    #[test]
    fn test_delta_event_parses() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#;
        let parsed: ContentBlockDeltaEvent = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.delta.delta_type, "text_delta");
        assert_eq!(parsed.delta.text.as_deref(), Some("hi"));
    }
}
