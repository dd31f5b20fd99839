//! Engine timing and sizing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Timing and sizing knobs for one meeting's engine instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Silence duration after the last fragment before a batch is released
    pub silence_ms: u64,
    /// Minimum spacing between consecutive batch emissions
    pub min_interval_ms: u64,
    /// How far back conversation is kept verbatim rather than summarised
    pub verbatim_window_ms: u64,
    /// Minimum spacing between summarisation passes
    pub summarise_interval_ms: u64,
    /// Per-generation-task time budget
    pub generation_timeout_ms: u64,
    /// Output budget for the rolling summary call
    pub summary_max_tokens: u32,
    /// Upper bound on diagrams a planning call may request
    pub max_planned_diagrams: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            silence_ms: 4_000,
            min_interval_ms: 15_000,
            verbatim_window_ms: 5 * 60 * 1000,
            summarise_interval_ms: 5 * 60 * 1000,
            generation_timeout_ms: 60_000,
            summary_max_tokens: 1024,
            max_planned_diagrams: 4,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn silence(&self) -> Duration {
        Duration::from_millis(self.silence_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}
