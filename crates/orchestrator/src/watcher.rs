//! Completion watcher.
//!
//! Polls the server-side record for one song until every submitted
//! variation has audio, the watch times out, or it is stopped through its
//! [`WatchHandle`]. Variations recorded as failed are not waited for.

use std::sync::Arc;

use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::SongVariations;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::events::{EventBus, OrchestratorEvent};
use crate::mirror::PersistenceMirror;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Every submitted variation has audio. Carries the final snapshot.
    Ready(SongVariations),
    TimedOut,
    Stopped,
}

#[derive(Clone)]
pub struct CompletionWatcher {
    mirror: Arc<PersistenceMirror>,
    events: EventBus,
    timings: Timings,
}

/// Handle to a running watch.
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<WatchOutcome>,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the watch to end.
    pub async fn join(self) -> WatchOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Completion watch task failed");
                WatchOutcome::Stopped
            }
        }
    }
}

impl CompletionWatcher {
    pub fn new(mirror: Arc<PersistenceMirror>, events: EventBus, timings: Timings) -> Self {
        Self {
            mirror,
            events,
            timings,
        }
    }

    /// Spawn a watch for one song. Cancelling `cancel` (or calling
    /// [`WatchHandle::stop`]) ends it with [`WatchOutcome::Stopped`].
    pub fn start(
        &self,
        order_id: OrderId,
        song_index: SongIndex,
        cancel: CancellationToken,
    ) -> WatchHandle {
        let watcher = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { watcher.run(order_id, song_index, token).await });
        WatchHandle { cancel, task }
    }

    async fn run(&self, order_id: OrderId, song_index: SongIndex, cancel: CancellationToken) -> WatchOutcome {
        let deadline = Instant::now() + self.timings.watch_timeout;
        let mut last_received = None;

        tracing::info!(order_id = %order_id, song_index, "Watching for generation results");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(order_id = %order_id, song_index, "Watch stopped");
                    return WatchOutcome::Stopped;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        order_id = %order_id,
                        song_index,
                        timeout_secs = self.timings.watch_timeout.as_secs(),
                        "Watch timed out",
                    );
                    return WatchOutcome::TimedOut;
                }
                _ = tokio::time::sleep(self.timings.poll_interval) => {}
            }

            let record = match self.mirror.poll(&order_id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!(order_id = %order_id, "Watched order has no record");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Completion poll failed");
                    continue;
                }
            };

            let song = record.variations.song(song_index).cloned().unwrap_or_default();
            let received = song.received_count();
            let expected = song.expected_count();
            if last_received != Some(received) {
                last_received = Some(received);
                self.events.publish(OrchestratorEvent::WatchProgress {
                    order_id: order_id.clone(),
                    song_index,
                    received,
                    expected,
                });
            }

            if song.is_complete() {
                tracing::info!(order_id = %order_id, song_index, received, expected, "Song ready");
                return WatchOutcome::Ready(song);
            }
            tracing::debug!(order_id = %order_id, song_index, received, expected, "Song not ready yet");
        }
    }
}
