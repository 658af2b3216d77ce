//! Issues one song's batch of variation requests.
//!
//! Requests within a batch are sequential and paced. Each outcome is
//! persisted through the mirror before the next request goes out, so
//! leaving mid-batch loses at most the request in flight.

use std::sync::Arc;

use huggnote_core::prompt::{truncate_prompt, CachedPrompt};
use huggnote_core::record::OrderPatch;
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::{TaskSlot, VariationBook, VariationId};
use huggnote_musicgen::GenerateRequest;

use crate::config::Timings;
use crate::error::OrchestratorResult;
use crate::events::{EventBus, OrchestratorEvent};
use crate::mirror::PersistenceMirror;
use crate::services::VariationGenerator;

/// Attempts per variation before it is recorded as failed.
const MAX_ATTEMPTS: u32 = 2;

/// What a finished batch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub submitted: Vec<(VariationId, String)>,
    pub failed: Vec<VariationId>,
}

impl BatchReport {
    pub fn all_failed(&self) -> bool {
        self.submitted.is_empty()
    }
}

pub struct GenerationRequestor {
    generator: Arc<dyn VariationGenerator>,
    mirror: Arc<PersistenceMirror>,
    events: EventBus,
    timings: Timings,
}

impl GenerationRequestor {
    pub fn new(
        generator: Arc<dyn VariationGenerator>,
        mirror: Arc<PersistenceMirror>,
        events: EventBus,
        timings: Timings,
    ) -> Self {
        Self {
            generator,
            mirror,
            events,
            timings,
        }
    }

    /// Request one variation, retrying once after the backoff on any
    /// failure. `None` once both attempts have failed.
    pub async fn request_variation(&self, request: &GenerateRequest) -> Option<String> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.generator.generate(request).await {
                Ok(task_id) => return Some(task_id),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        rate_limited = e.is_rate_limited(),
                        error = %e,
                        "Variation request failed",
                    );
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(self.timings.request_backoff).await;
                    }
                }
            }
        }
        None
    }

    /// Request every variation of one song from `prompt`.
    ///
    /// Individual failures are recorded as [`TaskSlot::Failed`] and do not
    /// stop the batch. Only a local persistence failure aborts it.
    pub async fn request_batch(
        &self,
        order_id: &OrderId,
        song_index: SongIndex,
        prompt: &CachedPrompt,
        voice_hint: Option<String>,
    ) -> OrchestratorResult<BatchReport> {
        let request = GenerateRequest {
            prompt: truncate_prompt(&prompt.prompt, self.timings.max_prompt_chars),
            music_style: prompt.music_style.clone(),
            voice_hint,
            instrumental: false,
        };
        let mut report = BatchReport::default();

        for variation_id in VariationId::all() {
            let task = match self.request_variation(&request).await {
                Some(task_id) => {
                    tracing::info!(
                        order_id = %order_id,
                        song_index,
                        variation_id = %variation_id,
                        task_id = %task_id,
                        "Variation submitted",
                    );
                    report.submitted.push((variation_id, task_id.clone()));
                    TaskSlot::Submitted { task_id }
                }
                None => {
                    tracing::warn!(
                        order_id = %order_id,
                        song_index,
                        variation_id = %variation_id,
                        "Variation failed after retry",
                    );
                    report.failed.push(variation_id);
                    TaskSlot::Failed
                }
            };

            let mut book = VariationBook::default();
            book.record_task(song_index, variation_id, task.clone(), prompt.music_style.clone());
            let patch = OrderPatch {
                variations: Some(book),
                ..Default::default()
            };
            self.mirror.save(order_id, &patch).await?;

            self.events.publish(OrchestratorEvent::VariationUpdated {
                order_id: order_id.clone(),
                song_index,
                variation_id,
                task,
            });

            if !variation_id.is_last() {
                tokio::time::sleep(self.timings.request_pacing).await;
            }
        }

        Ok(report)
    }
}
