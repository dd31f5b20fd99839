//! Provider trait and the tracing wrapper

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use crate::{
    error::Result,
    stream::ChunkStream,
    types::StreamRequest,
};

/// A streaming text-generation collaborator.
///
/// Implementations must support concurrent invocation: the engine fans out
/// independent artefact generations against the same provider instance.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a streaming generation, returning the chunk stream.
    async fn stream(&self, request: StreamRequest) -> Result<ChunkStream>;

    /// Run a generation to completion and return the full text.
    async fn complete(&self, request: StreamRequest) -> Result<String> {
        let stream = self.stream(request).await?;
        crate::stream::collect_text(stream).await
    }
}

/// Wraps a provider and traces every request/response at debug level.
pub struct LoggingProvider {
    inner: Arc<dyn LlmProvider>,
    label: String,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for LoggingProvider {
    async fn stream(&self, request: StreamRequest) -> Result<ChunkStream> {
        tracing::debug!(
            provider = %self.label,
            system_len = request.system_prompt.len(),
            user_len = request.user_content.len(),
            max_tokens = request.max_tokens,
            "llm request"
        );

        let label = self.label.clone();
        let mut inner = self.inner.stream(request).await?;

        let stream: ChunkStream = Box::pin(async_stream::stream! {
            let mut chars = 0usize;
            while let Some(chunk) = inner.next().await {
                if let Ok(ref text) = chunk {
                    chars += text.len();
                }
                yield chunk;
            }
            tracing::debug!(provider = %label, chars, "llm response complete");
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{chunk_stream_from_text, collect_text};

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn stream(&self, _request: StreamRequest) -> Result<ChunkStream> {
            Ok(chunk_stream_from_text(self.0))
        }
    }

    #[tokio::test]
    async fn test_logging_provider_is_transparent() {
        let provider = LoggingProvider::new(Arc::new(Canned("pass through")), "test");
        let stream = provider
            .stream(StreamRequest::new("sys", "user", 64))
            .await
            .unwrap();
        assert_eq!(collect_text(stream).await.unwrap(), "pass through");
    }

    #[tokio::test]
    async fn test_default_complete_collects_stream() {
        let provider = Canned("full text");
        let text = provider
            .complete(StreamRequest::new("sys", "user", 64))
            .await
            .unwrap();
        assert_eq!(text, "full text");
    }
}
