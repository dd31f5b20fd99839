//! scribe-engine: generation coordination for live conversations
//!
//! Turns a continuously growing transcript into derived artefacts (a spec,
//! user stories, diagrams) kept incrementally up to date. The engine decides
//! *when* generation runs (silence-based batching), *for which artefacts*
//! (classifier-gated triage), and *how many at once* (single-flight rounds
//! with per-task timeouts and bulkhead isolation).

pub mod batcher;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod modules;
pub mod normalise;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod triage;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use batcher::TranscriptBatcher;
pub use config::EngineConfig;
pub use context::ContextBuilder;
pub use error::{Error, Result};
pub use events::ArtefactEvent;
pub use modules::{ArtefactModule, DiagramModule, ModuleRegistry, SpecModule, StoriesModule};
pub use normalise::{NormalisedDiagram, normalise};
pub use scheduler::GenerationScheduler;
pub use session::MeetingSession;
pub use store::{ArtefactStore, MemoryStore};
pub use types::{
    DiagramPlan, DiagramRenderer, TranscriptBatch, TranscriptFragment,
};
