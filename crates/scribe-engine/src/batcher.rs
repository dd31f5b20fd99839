//! Transcript batching
//!
//! Accumulates finalized fragments and releases a batch once every speaker
//! has been silent for the configured threshold, subject to a minimum
//! spacing between emissions. A too-early emission is deferred, never
//! dropped; every accumulated batch is emitted exactly once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::types::{TranscriptBatch, TranscriptFragment};

struct BatcherState {
    fragments: Vec<TranscriptFragment>,
    /// Last-activity instant per participant
    participants: HashMap<String, Instant>,
    last_emit: Option<Instant>,
    deadline: Option<Instant>,
    stopped: bool,
}

/// Accumulates finalized transcript fragments and emits batches on silence.
pub struct TranscriptBatcher {
    inner: Arc<Mutex<BatcherState>>,
    notify: Arc<Notify>,
    tx: mpsc::UnboundedSender<TranscriptBatch>,
    silence: Duration,
    worker: tokio::task::JoinHandle<()>,
}

impl TranscriptBatcher {
    /// Spawn a batcher emitting on the given channel.
    pub fn spawn(config: &EngineConfig, tx: mpsc::UnboundedSender<TranscriptBatch>) -> Self {
        let inner = Arc::new(Mutex::new(BatcherState {
            fragments: Vec::new(),
            participants: HashMap::new(),
            last_emit: None,
            deadline: None,
            stopped: false,
        }));
        let notify = Arc::new(Notify::new());

        let worker = tokio::spawn(Self::run_timer(
            Arc::clone(&inner),
            Arc::clone(&notify),
            tx.clone(),
            config.silence(),
            config.min_interval(),
        ));

        Self {
            inner,
            notify,
            tx,
            silence: config.silence(),
            worker,
        }
    }

    /// Register a participant; their join time counts as activity.
    pub fn add_participant(&self, id: impl Into<String>) {
        self.inner
            .lock()
            .participants
            .insert(id.into(), Instant::now());
    }

    /// Remove a participant. If everyone left is already past the silence
    /// threshold the pending buffer becomes eligible for emission now.
    pub fn remove_participant(&self, id: &str) {
        let mut state = self.inner.lock();
        state.participants.remove(id);

        let now = Instant::now();
        let all_quiet = state
            .participants
            .values()
            .all(|last| now.duration_since(*last) >= self.silence);
        if !state.fragments.is_empty() && all_quiet {
            state.deadline = Some(now);
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Record a fragment. Non-final fragments exist only for live display
    /// and are dropped here.
    pub fn add(&self, fragment: TranscriptFragment) {
        if !fragment.is_final {
            return;
        }
        let mut state = self.inner.lock();
        if state.stopped {
            return;
        }
        let now = Instant::now();
        if let Some(speaker) = &fragment.speaker_id {
            state.participants.insert(speaker.clone(), now);
        }
        state.fragments.push(fragment);
        state.deadline = Some(now + self.silence);
        drop(state);
        self.notify.notify_one();
    }

    /// Flush whatever remains, synchronously, and shut the timer down.
    /// The min-interval floor does not apply to the final flush.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        emit_locked(&mut state, &self.tx);
        drop(state);
        self.notify.notify_one();
    }

    async fn run_timer(
        inner: Arc<Mutex<BatcherState>>,
        notify: Arc<Notify>,
        tx: mpsc::UnboundedSender<TranscriptBatch>,
        silence: Duration,
        min_interval: Duration,
    ) {
        loop {
            let notified = notify.notified();
            let deadline = {
                let state = inner.lock();
                if state.stopped {
                    return;
                }
                state.deadline
            };

            tokio::select! {
                _ = notified => {}
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    on_deadline(&inner, &tx, silence, min_interval);
                }
            }
        }
    }
}

impl Drop for TranscriptBatcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Deadline expiry: re-arm if a speaker is still inside the silence window
/// or the min-interval floor has not elapsed yet, emit otherwise.
fn on_deadline(
    inner: &Mutex<BatcherState>,
    tx: &mpsc::UnboundedSender<TranscriptBatch>,
    silence: Duration,
    min_interval: Duration,
) {
    let mut state = inner.lock();
    if state.stopped || state.fragments.is_empty() {
        state.deadline = None;
        return;
    }
    let now = Instant::now();

    if let Some(latest) = state.participants.values().max().copied() {
        let quiet_at = latest + silence;
        if quiet_at > now {
            state.deadline = Some(quiet_at);
            return;
        }
    }

    if let Some(last) = state.last_emit {
        let earliest = last + min_interval;
        if earliest > now {
            tracing::debug!("batch ready before min interval, deferring");
            state.deadline = Some(earliest);
            return;
        }
    }

    emit_locked(&mut state, tx);
}

fn emit_locked(state: &mut BatcherState, tx: &mpsc::UnboundedSender<TranscriptBatch>) {
    if state.fragments.is_empty() {
        return;
    }
    let fragments = std::mem::take(&mut state.fragments);
    let batch =
        TranscriptBatch::from_fragments(fragments, chrono::Utc::now().timestamp_millis());
    tracing::debug!(
        fragments = batch.fragments.len(),
        chars = batch.full_text.len(),
        "batch emitted"
    );
    state.last_emit = Some(Instant::now());
    state.deadline = None;
    let _ = tx.send(batch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    fn test_config(silence_ms: u64, min_interval_ms: u64) -> EngineConfig {
        EngineConfig {
            silence_ms,
            min_interval_ms,
            ..EngineConfig::default()
        }
    }

    fn fragment(text: &str, speaker: &str) -> TranscriptFragment {
        TranscriptFragment::final_now(text, Some(speaker.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_emits_one_batch_with_joined_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(4_000, 15_000), tx);
        batcher.add_participant("s1");

        let started = Instant::now();
        batcher.add(fragment("a", "s1"));
        advance(Duration::from_millis(500)).await;
        batcher.add(fragment("b", "s1"));
        advance(Duration::from_millis(500)).await;
        batcher.add(fragment("c", "s1"));

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.full_text, "a b c");
        assert_eq!(batch.fragments.len(), 3);

        // Last fragment at t=1000, silence threshold 4000 -> emission at ~5000.
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(4_500) && elapsed <= Duration::from_millis(5_500),
            "emitted at {:?}",
            elapsed
        );

        // Exactly one batch for the burst.
        advance(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_final_fragments_are_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(1_000, 0), tx);

        batcher.add(TranscriptFragment {
            text: "interim".into(),
            is_final: false,
            speaker_id: None,
            timestamp_ms: 0,
        });
        batcher.add(fragment("kept", "s1"));

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.full_text, "kept");
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_defers_but_never_drops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(1_000, 20_000), tx);

        let started = Instant::now();
        batcher.add(fragment("first", "s1"));
        let first = rx.recv().await.unwrap();
        assert_eq!(first.full_text, "first");
        let first_at = started.elapsed();

        // The second burst becomes silence-ready long before the floor allows it.
        batcher.add(fragment("second", "s1"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.full_text, "second");

        let spacing = started.elapsed() - first_at;
        assert!(
            spacing >= Duration::from_millis(20_000),
            "emissions only {:?} apart",
            spacing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_speaker_holds_the_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(4_000, 0), tx);

        batcher.add(fragment("one", "s1"));
        advance(Duration::from_millis(3_000)).await;
        batcher.add(fragment("two", "s1"));
        advance(Duration::from_millis(3_000)).await;

        // 6s in, but the speaker was active 3s ago: nothing yet.
        assert!(rx.try_recv().is_err());

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.full_text, "one two");
    }

    #[tokio::test(start_paused = true)]
    async fn test_participant_removal_releases_quiet_buffer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(4_000, 0), tx);
        batcher.add_participant("s1");
        batcher.add_participant("s2");

        batcher.add(fragment("only s1 spoke", "s1"));
        advance(Duration::from_millis(2_000)).await;
        // s2 rejoins at t=2000; their join counts as activity and pushes the
        // silence horizon out to t=6000.
        batcher.add_participant("s2");
        advance(Duration::from_millis(2_500)).await;
        assert!(rx.try_recv().is_err());

        // At t=4500 everyone except s2 has been quiet past the threshold, so
        // removing s2 releases the buffer without waiting for t=6000.
        batcher.remove_participant("s2");
        let batch = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("removal should release the buffer")
            .unwrap();
        assert_eq!(batch.full_text, "only s1 spoke");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_synchronously() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(60_000, 60_000), tx);

        // Nothing would fire on its own for a minute, but stop() must still
        // hand the buffer over without waiting.
        batcher.add(fragment("tail", "s1"));
        batcher.stop();

        let batch = rx.try_recv().expect("stop flushes without waiting");
        assert_eq!(batch.full_text, "tail");
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_stop_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let batcher = TranscriptBatcher::spawn(&test_config(100, 0), tx);
        batcher.stop();
        batcher.add(fragment("late", "s1"));
        advance(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
