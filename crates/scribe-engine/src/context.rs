//! Rolling conversation context
//!
//! Owns the verbatim window, the rolling summary, and the last-known content
//! of every artefact. The invariant throughout: summary and verbatim window
//! together cover the whole conversation with no gap and no overlap —
//! fragments are only removed from the verbatim list after the summarisation
//! call has succeeded and their content lives on in the summary.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use scribe_llm::{LlmProvider, StreamRequest};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::store::ArtefactStore;
use crate::types::{ArtefactState, DIAGRAM_KEY_PREFIX, TranscriptBatch};

const SUMMARISE_SYSTEM_PROMPT: &str = "Summarise the following meeting transcript into concise bullet points. \
Preserve key decisions, action items, and technical details. \
Be brief but don't lose important information.";

struct ContextState {
    batches: Vec<TranscriptBatch>,
    summary: String,
    /// Everything at or before this instant is represented by the summary
    covered_until_ms: i64,
    last_summarised_ms: i64,
    artefacts: HashMap<String, ArtefactState>,
}

/// Per-meeting rolling context and artefact state.
pub struct ContextBuilder {
    project_id: String,
    store: Arc<dyn ArtefactStore>,
    summariser: Arc<dyn LlmProvider>,
    config: EngineConfig,
    state: Mutex<ContextState>,
    summarising: AtomicBool,
}

impl ContextBuilder {
    /// Create a builder hydrated from the persistence collaborator.
    pub async fn hydrate(
        store: Arc<dyn ArtefactStore>,
        project_id: impl Into<String>,
        summariser: Arc<dyn LlmProvider>,
        config: EngineConfig,
    ) -> Result<Self> {
        let project_id = project_id.into();
        let stored = store.load_artefacts(&project_id).await?;
        let now = now_ms();
        let artefacts = stored
            .into_iter()
            .map(|(key, content)| {
                (
                    key,
                    ArtefactState {
                        content,
                        last_updated_ms: now,
                    },
                )
            })
            .collect();

        Ok(Self {
            project_id,
            store,
            summariser,
            config,
            state: Mutex::new(ContextState {
                batches: Vec::new(),
                summary: String::new(),
                covered_until_ms: 0,
                last_summarised_ms: now,
                artefacts,
            }),
            summarising: AtomicBool::new(false),
        })
    }

    /// Append an emitted batch to the verbatim window.
    pub fn add_batch(&self, batch: TranscriptBatch) {
        self.state.lock().batches.push(batch);
    }

    /// Fold fragments older than the verbatim window into the rolling
    /// summary. Runs at most once per configured interval; overlapping
    /// attempts collapse into a no-op. A failed summarisation leaves both
    /// the summary and the verbatim list untouched and is retried on the
    /// next tick.
    pub async fn maybe_summarise(&self) {
        let now = now_ms();
        {
            let state = self.state.lock();
            if now - state.last_summarised_ms < self.config.summarise_interval_ms as i64 {
                return;
            }
        }
        if self.summarising.swap(true, Ordering::AcqRel) {
            return;
        }

        let cutoff = now - self.config.verbatim_window_ms as i64;
        let request = {
            let state = self.state.lock();
            let old_text = state
                .batches
                .iter()
                .filter(|b| b.end_ms <= cutoff)
                .map(|b| b.full_text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            if old_text.is_empty() {
                None
            } else if state.summary.is_empty() {
                Some(old_text)
            } else {
                Some(format!(
                    "Previous summary:\n{}\n\nNew transcript to incorporate:\n{}",
                    state.summary, old_text
                ))
            }
        };

        if let Some(user_content) = request {
            let result = self
                .summariser
                .complete(StreamRequest::new(
                    SUMMARISE_SYSTEM_PROMPT,
                    user_content,
                    self.config.summary_max_tokens,
                ))
                .await;

            match result {
                Ok(summary) => {
                    let mut state = self.state.lock();
                    state.summary = summary;
                    state.covered_until_ms = cutoff;
                    state.batches.retain(|b| b.end_ms > cutoff);
                    state.last_summarised_ms = now;
                }
                Err(e) => {
                    tracing::warn!("summarisation failed, will retry next tick: {}", e);
                }
            }
        }

        self.summarising.store(false, Ordering::Release);
    }

    /// Compose the prompt context for one artefact.
    ///
    /// Sections in order: summary, then the verbatim window, then a
    /// full-history fallback when both would otherwise be empty (the very
    /// first turn), and for diagram keys a listing of every *other* diagram's
    /// current content so siblings stay consistent.
    pub fn build_prompt_context(&self, artefact_key: &str, exclude_key: Option<&str>) -> String {
        let state = self.state.lock();
        let cutoff = now_ms() - self.config.verbatim_window_ms as i64;

        let mut parts: Vec<String> = Vec::new();

        if !state.summary.is_empty() {
            parts.push(format!(
                "## Earlier in the meeting (summary)\n{}",
                state.summary
            ));
        }

        let recent = state
            .batches
            .iter()
            .filter(|b| b.end_ms > cutoff)
            .map(|b| b.full_text.as_str())
            .collect::<Vec<_>>();

        if !recent.is_empty() {
            parts.push(format!("## Recent conversation\n{}", recent.join("\n\n")));
        } else if state.summary.is_empty() && !state.batches.is_empty() {
            let all = state
                .batches
                .iter()
                .map(|b| b.full_text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            parts.push(format!("## Conversation so far\n{}", all));
        }

        if artefact_key.starts_with(DIAGRAM_KEY_PREFIX) {
            let excluded = exclude_key.unwrap_or(artefact_key);
            let mut siblings: Vec<(&String, &ArtefactState)> = state
                .artefacts
                .iter()
                .filter(|(key, _)| key.starts_with(DIAGRAM_KEY_PREFIX) && key.as_str() != excluded)
                .collect();
            siblings.sort_by(|a, b| a.0.cmp(b.0));

            if !siblings.is_empty() {
                let mut section =
                    String::from("## Other diagrams (keep consistent, do not regenerate)");
                for (key, artefact) in siblings {
                    section.push_str(&format!("\n### {}\n{}", key, artefact.content));
                }
                parts.push(section);
            }
        }

        parts.join("\n\n")
    }

    /// Current content of one artefact.
    pub fn artefact_content(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .artefacts
            .get(key)
            .map(|a| a.content.clone())
    }

    /// Snapshot of every artefact's state.
    pub fn artefact_states(&self) -> HashMap<String, ArtefactState> {
        self.state.lock().artefacts.clone()
    }

    /// Keys of every known diagram artefact, sorted.
    pub fn diagram_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .lock()
            .artefacts
            .keys()
            .filter(|k| k.starts_with(DIAGRAM_KEY_PREFIX))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Replace one artefact's content and write it through to the store.
    pub async fn update_artefact(&self, key: &str, content: String) -> Result<()> {
        self.store
            .save_artefact(&self.project_id, key, &content)
            .await?;
        self.state.lock().artefacts.insert(
            key.to_string(),
            ArtefactState {
                content,
                last_updated_ms: now_ms(),
            },
        );
        Ok(())
    }

    /// Remove every diagram artefact (bulk regeneration path).
    pub async fn clear_diagram_artefacts(&self) -> Result<()> {
        let keys = self.diagram_keys();
        for key in &keys {
            self.store.delete_artefact(&self.project_id, key).await?;
        }
        let mut state = self.state.lock();
        for key in &keys {
            state.artefacts.remove(key);
        }
        Ok(())
    }

    /// Remove a single diagram artefact.
    pub async fn clear_single_diagram(&self, key: &str) -> Result<()> {
        self.store.delete_artefact(&self.project_id, key).await?;
        self.state.lock().artefacts.remove(key);
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
