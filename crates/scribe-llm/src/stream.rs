//! Chunk stream type and helpers

use std::pin::Pin;

use futures::StreamExt;
use tokio_stream::Stream;

use crate::error::Result;

/// A stream of text deltas from a provider.
///
/// Chunks arrive in order; the end of the stream signals completion. An
/// `Err` item terminates the logical stream even if more items follow.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Drain a chunk stream into the full accumulated text.
pub async fn collect_text(mut stream: ChunkStream) -> Result<String> {
    let mut full = String::new();
    while let Some(chunk) = stream.next().await {
        full.push_str(&chunk?);
    }
    Ok(full)
}

/// Wrap a fixed string as a single-chunk stream. Useful for tests and
/// canned responses.
pub fn chunk_stream_from_text(text: impl Into<String>) -> ChunkStream {
    let text = text.into();
    Box::pin(async_stream::stream! {
        yield Ok(text);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_text_concatenates_in_order() {
        let stream: ChunkStream = Box::pin(async_stream::stream! {
            yield Ok("hello ".to_string());
            yield Ok("world".to_string());
        });
        assert_eq!(collect_text(stream).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_collect_text_stops_on_error() {
        let stream: ChunkStream = Box::pin(async_stream::stream! {
            yield Ok("partial".to_string());
            yield Err(crate::Error::Sse("dropped".into()));
        });
        assert!(collect_text(stream).await.is_err());
    }

    #[tokio::test]
    async fn test_single_chunk_stream() {
        let stream = chunk_stream_from_text("canned");
        assert_eq!(collect_text(stream).await.unwrap(), "canned");
    }
}
