//! Generation scheduler
//!
//! Runs generation rounds one at a time per meeting. A trigger that arrives
//! mid-round does not queue: it replaces the pending batch, so at most one
//! extra round runs no matter how many batches landed meanwhile. Within a
//! round, text artefacts run concurrently, then diagram deletions, then
//! diagram updates, then creations one by one so each new diagram sees its
//! freshly created siblings. Every task races a timeout and failures never
//! cross task boundaries.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use scribe_llm::{ChunkStream, LlmProvider};

use crate::config::EngineConfig;
use crate::context::ContextBuilder;
use crate::error::{Error, Result};
use crate::events::ArtefactEvent;
use crate::modules::{DiagramModule, ModuleRegistry, fallback_plan};
use crate::normalise::normalise;
use crate::triage;
use crate::types::{
    DIAGRAM_DELETE_PREFIX, DIAGRAM_KEY_PREFIX, DIAGRAM_NEW_PREFIX, DiagramPlan, DiagramRenderer,
    TranscriptBatch, diagram_subtype,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct RunState {
    busy: bool,
    pending: Option<TranscriptBatch>,
}

/// What one round will touch, derived from the triage selection.
#[derive(Default)]
struct RoundPlan {
    text: Vec<String>,
    deletes: Vec<String>,
    updates: Vec<String>,
    creations: Vec<DiagramPlan>,
    /// Run the planner instead of explicit creations (first diagrams)
    plan_fresh: bool,
}

/// Coordinates generation rounds for one meeting.
pub struct GenerationScheduler {
    config: EngineConfig,
    registry: Arc<ModuleRegistry>,
    context: Arc<ContextBuilder>,
    triage_provider: Arc<dyn LlmProvider>,
    events: broadcast::Sender<ArtefactEvent>,
    state: Mutex<RunState>,
}

impl GenerationScheduler {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ModuleRegistry>,
        context: Arc<ContextBuilder>,
        triage_provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            registry,
            context,
            triage_provider,
            events,
            state: Mutex::new(RunState {
                busy: false,
                pending: None,
            }),
        }
    }

    /// Receiver for this meeting's artefact events.
    pub fn subscribe(&self) -> broadcast::Receiver<ArtefactEvent> {
        self.events.subscribe()
    }

    /// Run a triage-gated round for `batch`. If a round is already running
    /// the batch becomes the pending one (replacing any previous pending
    /// batch) and this returns immediately.
    pub async fn trigger(&self, batch: TranscriptBatch) {
        {
            let mut state = self.state.lock();
            if state.busy {
                state.pending = Some(batch);
                return;
            }
            state.busy = true;
        }
        self.run_triaged_round(&batch).await;
        self.drain_pending().await;
    }

    /// Rebuild every text artefact and every existing diagram, bypassing
    /// triage. Used after a bulk transcript import.
    pub async fn trigger_all(&self) -> Result<()> {
        self.try_acquire()?;

        let plan = RoundPlan {
            text: self.registry.text_keys(),
            updates: self.context.diagram_keys(),
            ..RoundPlan::default()
        };
        self.emit(ArtefactEvent::RoundStart);
        self.run_phases(plan).await;
        self.emit(ArtefactEvent::RoundEnd);

        self.drain_pending().await;
        Ok(())
    }

    /// Generate one new diagram of the given kind on demand.
    pub async fn add_diagram(&self, kind: &str, renderer: DiagramRenderer) -> Result<()> {
        self.try_acquire()?;

        let plan = DiagramPlan {
            diagram_type: kind.to_string(),
            focus: format!("{} diagram requested during the meeting", kind),
            renderer,
        };
        self.emit(ArtefactEvent::RoundStart);
        self.run_diagram_task(&plan.artefact_key(), &plan, false)
            .await;
        self.emit(ArtefactEvent::RoundEnd);

        self.drain_pending().await;
        Ok(())
    }

    /// Discard every diagram and re-plan from the current conversation.
    pub async fn regenerate_diagrams(&self) -> Result<()> {
        self.try_acquire()?;
        self.emit(ArtefactEvent::RoundStart);

        for key in self.context.diagram_keys() {
            self.remove_diagram(&key).await;
        }

        for plan in self.plan_or_fallback().await {
            self.run_diagram_task(&plan.artefact_key(), &plan, false)
                .await;
        }

        self.emit(ArtefactEvent::RoundEnd);
        self.drain_pending().await;
        Ok(())
    }

    /// Discard and regenerate a single diagram.
    pub async fn regenerate_single_diagram(
        &self,
        kind: &str,
        renderer: DiagramRenderer,
    ) -> Result<()> {
        self.try_acquire()?;

        let plan = DiagramPlan {
            diagram_type: kind.to_string(),
            focus: format!("regenerated {} diagram", kind),
            renderer,
        };
        let key = plan.artefact_key();

        self.emit(ArtefactEvent::RoundStart);
        if self.context.artefact_content(&key).is_some() {
            self.remove_diagram(&key).await;
        }
        self.run_diagram_task(&key, &plan, false).await;
        self.emit(ArtefactEvent::RoundEnd);

        self.drain_pending().await;
        Ok(())
    }

    fn try_acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.busy {
            return Err(Error::Busy);
        }
        state.busy = true;
        Ok(())
    }

    /// Run rounds for batches that arrived mid-round, then release the gate.
    async fn drain_pending(&self) {
        loop {
            let batch = {
                let mut state = self.state.lock();
                match state.pending.take() {
                    Some(batch) => batch,
                    None => {
                        state.busy = false;
                        return;
                    }
                }
            };
            self.run_triaged_round(&batch).await;
        }
    }

    async fn run_triaged_round(&self, batch: &TranscriptBatch) {
        self.emit(ArtefactEvent::RoundStart);

        let known_diagrams = self.context.diagram_keys();
        let selected = triage::classify(
            self.triage_provider.as_ref(),
            &batch.full_text,
            &self.registry,
            &known_diagrams,
        )
        .await;

        if selected.is_empty() {
            tracing::debug!("triage selected nothing, skipping round");
        } else {
            tracing::info!(?selected, "generation round");
            let plan = self.partition(selected, &known_diagrams);
            self.run_phases(plan).await;
        }

        self.emit(ArtefactEvent::RoundEnd);
    }

    fn partition(&self, selected: Vec<String>, known_diagrams: &[String]) -> RoundPlan {
        let mut plan = RoundPlan::default();

        for key in selected {
            if self.registry.text_module(&key).is_some() {
                plan.text.push(key);
            } else if key == DiagramModule::KEY {
                if known_diagrams.is_empty() {
                    plan.plan_fresh = true;
                } else {
                    for existing in known_diagrams {
                        if !plan.updates.contains(existing) {
                            plan.updates.push(existing.clone());
                        }
                    }
                }
            } else if let Some(kind) = key.strip_prefix(DIAGRAM_DELETE_PREFIX) {
                let target = format!("{}{}", DIAGRAM_KEY_PREFIX, kind);
                if known_diagrams.contains(&target) {
                    plan.deletes.push(target);
                } else {
                    tracing::warn!(key, "delete directive for unknown diagram, skipping");
                }
            } else if let Some(kind) = key.strip_prefix(DIAGRAM_NEW_PREFIX) {
                let existing = format!("{}{}", DIAGRAM_KEY_PREFIX, kind);
                if known_diagrams.contains(&existing) {
                    if !plan.updates.contains(&existing) {
                        plan.updates.push(existing);
                    }
                } else {
                    plan.creations.push(DiagramPlan {
                        diagram_type: kind.to_string(),
                        focus: format!("{} diagram requested in the conversation", kind),
                        renderer: DiagramRenderer::default_for_kind(kind),
                    });
                }
            } else if known_diagrams.contains(&key) {
                if !plan.updates.contains(&key) {
                    plan.updates.push(key);
                }
            } else {
                tracing::warn!(key, "skipping unknown artefact key");
            }
        }

        // A deleted diagram is not also updated in the same round.
        plan.updates.retain(|key| !plan.deletes.contains(key));
        plan
    }

    async fn run_phases(&self, plan: RoundPlan) {
        futures::future::join_all(plan.text.iter().map(|key| self.run_text_task(key))).await;

        for key in &plan.deletes {
            self.remove_diagram(key).await;
        }

        futures::future::join_all(
            plan.updates
                .iter()
                .map(|key| self.run_diagram_update(key)),
        )
        .await;

        let creations = if plan.plan_fresh {
            self.plan_or_fallback().await
        } else {
            plan.creations
        };

        for plan in &creations {
            self.run_diagram_task(&plan.artefact_key(), plan, false).await;
        }
    }

    /// Plan fresh diagrams from the current conversation. The planning call
    /// has no artefact of its own, so it emits no lifecycle events: a planner
    /// failure falls back to a single overview flowchart, a planner timeout
    /// creates nothing.
    async fn plan_or_fallback(&self) -> Vec<DiagramPlan> {
        let context = self.context.build_prompt_context(DiagramModule::KEY, None);
        if context.trim().is_empty() {
            return Vec::new();
        }
        match tokio::time::timeout(
            self.config.generation_timeout(),
            self.registry
                .diagram()
                .plan_diagrams(&context, self.config.max_planned_diagrams),
        )
        .await
        {
            Ok(Ok(plans)) => plans,
            Ok(Err(e)) => {
                tracing::warn!("diagram planning failed, using fallback plan: {}", e);
                vec![fallback_plan()]
            }
            Err(_) => {
                tracing::warn!(
                    after_ms = self.config.generation_timeout_ms,
                    "diagram planning timed out, creating nothing"
                );
                Vec::new()
            }
        }
    }

    async fn run_text_task(&self, key: &str) {
        let Some(module) = self.registry.text_module(key) else {
            tracing::warn!(key, "no module registered for text artefact");
            return;
        };

        let context = self.context.build_prompt_context(key, None);
        if context.trim().is_empty() {
            return;
        }
        let current = self.context.artefact_content(key);

        self.emit(ArtefactEvent::Start {
            artefact: key.to_string(),
            renderer: None,
        });

        let outcome = tokio::time::timeout(self.config.generation_timeout(), async {
            let stream = module.generate(&context, current.as_deref()).await?;
            self.forward_chunks(key, stream).await
        })
        .await;

        match outcome {
            Ok(Ok(content)) => self.complete_artefact(key, content).await,
            Ok(Err(e)) => {
                tracing::warn!(key, "generation failed: {}", e);
                self.emit_task_error(key, &e.to_string());
            }
            Err(_) => self.emit_timeout_error(key),
        }
    }

    async fn run_diagram_update(&self, key: &str) {
        let Some(current) = self.context.artefact_content(key) else {
            tracing::warn!(key, "diagram vanished before update, skipping");
            return;
        };
        let Some(subtype) = diagram_subtype(key) else {
            tracing::warn!(key, "not a concrete diagram key, skipping update");
            return;
        };
        let plan = DiagramPlan {
            diagram_type: subtype.to_string(),
            focus: "incorporate the new discussion".to_string(),
            renderer: DiagramRenderer::infer(&current),
        };
        self.run_diagram_task(key, &plan, true).await;
    }

    async fn run_diagram_task(&self, key: &str, plan: &DiagramPlan, is_update: bool) {
        let context = self.context.build_prompt_context(key, Some(key));
        if context.trim().is_empty() {
            return;
        }
        let current = if is_update {
            self.context.artefact_content(key)
        } else {
            None
        };

        self.emit(ArtefactEvent::Start {
            artefact: key.to_string(),
            renderer: Some(plan.renderer),
        });

        let outcome = tokio::time::timeout(self.config.generation_timeout(), async {
            let stream = self
                .registry
                .diagram()
                .generate_diagram(&context, plan, current.as_deref())
                .await?;
            self.forward_chunks(key, stream).await
        })
        .await;

        match outcome {
            Ok(Ok(raw)) => {
                let normalised = normalise(&raw, plan.renderer);
                if normalised.valid {
                    self.complete_artefact(key, normalised.content).await;
                } else {
                    tracing::warn!(key, "discarding diagram that failed validation");
                    self.emit_task_error(
                        key,
                        &Error::InvalidDiagram {
                            artefact: key.to_string(),
                        }
                        .to_string(),
                    );
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(key, "generation failed: {}", e);
                self.emit_task_error(key, &e.to_string());
            }
            Err(_) => self.emit_timeout_error(key),
        }
    }

    /// Drain a chunk stream, forwarding each delta as an event.
    async fn forward_chunks(&self, key: &str, mut stream: ChunkStream) -> Result<String> {
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            let delta = chunk?;
            full.push_str(&delta);
            self.emit(ArtefactEvent::Chunk {
                artefact: key.to_string(),
                delta,
            });
        }
        Ok(full)
    }

    async fn complete_artefact(&self, key: &str, content: String) {
        match self.context.update_artefact(key, content.clone()).await {
            Ok(()) => self.emit(ArtefactEvent::Complete {
                artefact: key.to_string(),
                content,
            }),
            Err(e) => {
                tracing::warn!(key, "failed to persist artefact: {}", e);
                self.emit_task_error(key, &e.to_string());
            }
        }
    }

    async fn remove_diagram(&self, key: &str) {
        match self.context.clear_single_diagram(key).await {
            Ok(()) => self.emit(ArtefactEvent::Removed {
                artefact: key.to_string(),
            }),
            Err(e) => {
                tracing::warn!(key, "failed to delete diagram: {}", e);
                self.emit_task_error(key, &e.to_string());
            }
        }
    }

    fn emit_timeout_error(&self, key: &str) {
        let e = Error::Timeout {
            artefact: key.to_string(),
            after_ms: self.config.generation_timeout_ms,
        };
        tracing::warn!(key, "{}", e);
        self.emit_task_error(key, &e.to_string());
    }

    fn emit_task_error(&self, key: &str, message: &str) {
        self.emit(ArtefactEvent::Error {
            artefact: key.to_string(),
            message: message.to_string(),
        });
    }

    fn emit(&self, event: ArtefactEvent) {
        let _ = self.events.send(event);
    }
}
