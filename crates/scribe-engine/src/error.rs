//! Error types for scribe-engine

use thiserror::Error;

/// Result type alias using scribe-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during generation coordination
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the LLM provider layer
    #[error(transparent)]
    Llm(#[from] scribe_llm::Error),

    /// A generation task exceeded its time budget
    #[error("{artefact} timed out after {after_ms}ms")]
    Timeout { artefact: String, after_ms: u64 },

    /// A diagram generation produced output that fails grammar validation
    #[error("invalid diagram output for {artefact}")]
    InvalidDiagram { artefact: String },

    /// A manual operation was refused because a round is already running
    #[error("a generation round is already running")]
    Busy,

    /// Persistence collaborator failure
    #[error("store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
