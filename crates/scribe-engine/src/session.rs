//! Per-meeting wiring
//!
//! A session owns one batcher, one context builder, and one scheduler, and
//! the pump task connecting them: each emitted batch is appended to the
//! context, a summarisation check is kicked off, and a round is triggered on
//! its own task so that coalescing, not queuing, serialises rounds. Sessions
//! share nothing with each other.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use scribe_llm::{LlmProvider, ProviderFactory};

use crate::batcher::TranscriptBatcher;
use crate::config::EngineConfig;
use crate::context::ContextBuilder;
use crate::error::Result;
use crate::events::ArtefactEvent;
use crate::modules::ModuleRegistry;
use crate::scheduler::GenerationScheduler;
use crate::store::ArtefactStore;
use crate::types::{TranscriptBatch, TranscriptFragment};

/// One live meeting: transcript in, artefact events out.
pub struct MeetingSession {
    batcher: TranscriptBatcher,
    context: Arc<ContextBuilder>,
    scheduler: Arc<GenerationScheduler>,
    pump: JoinHandle<()>,
}

impl MeetingSession {
    /// Start a session with the standard module set, wiring each generator
    /// role to its configured provider.
    pub async fn start(
        store: Arc<dyn ArtefactStore>,
        project_id: impl Into<String>,
        factory: &ProviderFactory,
        config: EngineConfig,
    ) -> Result<Self> {
        let registry = Arc::new(ModuleRegistry::standard(factory)?);
        let summariser = factory.provider_for("summary")?;
        let triage_provider = factory.provider_for("triage")?;
        Self::start_with(store, project_id, registry, summariser, triage_provider, config).await
    }

    /// Start a session with explicit collaborators.
    pub async fn start_with(
        store: Arc<dyn ArtefactStore>,
        project_id: impl Into<String>,
        registry: Arc<ModuleRegistry>,
        summariser: Arc<dyn LlmProvider>,
        triage_provider: Arc<dyn LlmProvider>,
        config: EngineConfig,
    ) -> Result<Self> {
        let context = Arc::new(
            ContextBuilder::hydrate(store, project_id, summariser, config.clone()).await?,
        );
        let scheduler = Arc::new(GenerationScheduler::new(
            config.clone(),
            registry,
            context.clone(),
            triage_provider,
        ));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&config, tx);

        let pump = tokio::spawn({
            let context = context.clone();
            let scheduler = scheduler.clone();
            async move {
                let mut rounds = JoinSet::new();
                while let Some(batch) = rx.recv().await {
                    context.add_batch(batch.clone());
                    {
                        let context = context.clone();
                        rounds.spawn(async move { context.maybe_summarise().await });
                    }
                    let scheduler = scheduler.clone();
                    rounds.spawn(async move { scheduler.trigger(batch).await });
                }
                while rounds.join_next().await.is_some() {}
            }
        });

        Ok(Self {
            batcher,
            context,
            scheduler,
            pump,
        })
    }

    /// Feed one transcript fragment from the capture layer.
    pub fn push_fragment(&self, fragment: TranscriptFragment) {
        self.batcher.add(fragment);
    }

    /// Feed typed text. Same path as speech.
    pub fn push_text(&self, text: impl Into<String>) {
        self.batcher.add(TranscriptFragment::final_now(text, None));
    }

    /// Ingest a whole pre-existing transcript and rebuild every artefact.
    pub async fn import_transcript(&self, text: impl Into<String>) -> Result<()> {
        self.context.add_batch(TranscriptBatch::from_text(text));
        self.scheduler.trigger_all().await
    }

    /// Receiver for this meeting's artefact events.
    pub fn subscribe(&self) -> broadcast::Receiver<ArtefactEvent> {
        self.scheduler.subscribe()
    }

    pub fn batcher(&self) -> &TranscriptBatcher {
        &self.batcher
    }

    pub fn context(&self) -> &Arc<ContextBuilder> {
        &self.context
    }

    pub fn scheduler(&self) -> &Arc<GenerationScheduler> {
        &self.scheduler
    }

    /// Flush buffered transcript and wait for in-flight rounds to finish.
    pub async fn shutdown(self) {
        self.batcher.stop();
        // closes the batch channel so the pump drains and exits
        drop(self.batcher);
        let _ = self.pump.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{DiagramModule, SpecModule, StoriesModule};
    use crate::store::MemoryStore;
    use crate::testutil::ScriptedProvider;
    use std::time::Duration;

    fn registry(provider: Arc<ScriptedProvider>) -> Arc<ModuleRegistry> {
        Arc::new(ModuleRegistry::new(
            vec![
                Arc::new(SpecModule::new(provider.clone())),
                Arc::new(StoriesModule::new(provider.clone())),
            ],
            DiagramModule::new(provider),
        ))
    }

    async fn session(store: Arc<MemoryStore>, triage_response: &str) -> MeetingSession {
        MeetingSession::start_with(
            store,
            "p1",
            registry(Arc::new(ScriptedProvider::always("# Generated"))),
            Arc::new(ScriptedProvider::always("summary")),
            Arc::new(ScriptedProvider::always(triage_response)),
            EngineConfig::default(),
        )
        .await
        .unwrap()
    }

    async fn wait_for_complete(
        events: &mut broadcast::Receiver<ArtefactEvent>,
        key: &str,
    ) -> String {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(300), events.recv())
                .await
                .expect("no event before deadline")
                .expect("event channel closed");
            if let ArtefactEvent::Complete { artefact, content } = event {
                if artefact == key {
                    return content;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_to_artefact_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let session = session(store.clone(), r#"["spec"]"#).await;
        let mut events = session.subscribe();

        session.push_text("we are building a billing service");

        // Silence elapses, the batch emits, the round runs.
        let content = wait_for_complete(&mut events, "spec").await;
        assert_eq!(content, "# Generated");

        session.shutdown().await;
        assert_eq!(store.get("p1", "spec").as_deref(), Some("# Generated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_transcript_rebuilds_everything() {
        let store = Arc::new(MemoryStore::new());
        let session = session(store.clone(), r#"[]"#).await;
        let mut events = session.subscribe();

        session
            .import_transcript("full transcript of an earlier meeting")
            .await
            .unwrap();

        // Triage is bypassed: both text artefacts rebuild even though the
        // classifier would have selected nothing.
        wait_for_complete(&mut events, "spec").await;
        assert!(store.get("p1", "stories").is_some());

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_buffered_transcript() {
        let store = Arc::new(MemoryStore::new());
        let session = session(store.clone(), r#"["spec"]"#).await;

        session.push_text("decision made right before hanging up");
        session.shutdown().await;

        assert_eq!(store.get("p1", "spec").as_deref(), Some("# Generated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_meetings_are_isolated() {
        let store_a = Arc::new(MemoryStore::new());
        let store_b = Arc::new(MemoryStore::new());
        let session_a = session(store_a.clone(), r#"["spec"]"#).await;
        let session_b = session(store_b.clone(), r#"["spec"]"#).await;
        let mut events_a = session_a.subscribe();
        let mut events_b = session_b.subscribe();

        session_a.push_text("only meeting A talks");
        wait_for_complete(&mut events_a, "spec").await;

        assert!(events_b.try_recv().is_err());
        assert!(store_b.get("p1", "spec").is_none());
        assert!(session_b.context().artefact_content("spec").is_none());

        session_a.shutdown().await;
        session_b.shutdown().await;
    }
}
