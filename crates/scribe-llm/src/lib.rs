//! scribe-llm: streaming LLM provider abstraction
//!
//! This crate is the boundary between the generation engine and the
//! generative model collaborators. It defines the text-chunk streaming
//! contract, a provider trait, concrete SSE-backed providers, and
//! per-generator provider selection.

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;
pub mod stream;
pub mod types;

pub use config::{LlmConfig, ProviderFactory, ProviderKind};
pub use error::{Error, Result};
pub use provider::{LlmProvider, LoggingProvider};
pub use stream::{ChunkStream, chunk_stream_from_text, collect_text};
pub use types::StreamRequest;
