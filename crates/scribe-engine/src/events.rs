//! Artefact lifecycle events
//!
//! Per artefact per round the engine emits exactly one `Start`, zero or more
//! `Chunk`s, then exactly one of `Complete` / `Error`. Deletions emit
//! `Removed`. Round boundaries are observable via `RoundStart` / `RoundEnd`.

use serde::{Deserialize, Serialize};

use crate::types::DiagramRenderer;

/// Events emitted during a generation round
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtefactEvent {
    /// A generation round started
    RoundStart,

    /// Generation for one artefact started
    Start {
        artefact: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        renderer: Option<DiagramRenderer>,
    },

    /// A streamed text delta for one artefact
    Chunk { artefact: String, delta: String },

    /// Generation for one artefact completed; `content` is the full text
    Complete { artefact: String, content: String },

    /// Generation for one artefact failed (timeout, stream error, invalid output)
    Error { artefact: String, message: String },

    /// An artefact was deleted
    Removed { artefact: String },

    /// The round finished; failures are per-artefact, never fatal
    RoundEnd,
}
