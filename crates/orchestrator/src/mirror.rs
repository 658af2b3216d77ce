//! Persistence mirror: the local store and the server-side record kept in
//! step.
//!
//! Every change is applied to the local copy first, then pushed to the
//! record service with at most one retry. A failed push leaves the change
//! local-only and publishes [`OrchestratorEvent::SyncDegraded`]; the next
//! successful push or poll reconciles the two copies.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use huggnote_core::error::CoreError;
use huggnote_core::order::OrderForm;
use huggnote_core::record::{NewOrder, OrderPatch, OrderRecord};
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_musicgen::HttpApiError;
use tokio::sync::Mutex;

use crate::error::OrchestratorResult;
use crate::events::{EventBus, OrchestratorEvent};
use crate::record_client::RecordService;
use crate::store::LocalStore;

/// Result of a write through the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// The local record after the write.
    pub record: OrderRecord,
    /// Whether the record service accepted the write.
    pub synced: bool,
}

pub struct PersistenceMirror {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RecordService>,
    events: EventBus,
    /// Serializes read-modify-write cycles on local records.
    write_lock: Mutex<()>,
}

/// Fold the server's copy into the local one.
///
/// The local record carries the client's latest intent, so its prompts and
/// selections win; the server contributes webhook results, entries written
/// by other sessions, and a final status.
pub fn reconcile(local: &OrderRecord, remote: &OrderRecord) -> OrderRecord {
    let mut merged = local.clone();
    merged.variations.merge_from(&remote.variations);

    let mut prompts = remote.prompts.clone();
    prompts.merge_from(&local.prompts);
    merged.prompts = prompts;

    for (index, variation) in remote.selections.iter() {
        if merged.selections.get(index).is_none() {
            merged.selections.select(index, variation);
        }
    }
    if merged.user_id.is_none() {
        merged.user_id.clone_from(&remote.user_id);
    }
    if remote.status.is_final() {
        merged.status = remote.status;
    }
    merged.created_at = remote.created_at.min(local.created_at);
    merged.updated_at = remote.updated_at.max(local.updated_at);
    merged
}

/// The patch actually pushed: the caller's scalar changes plus the full
/// local maps. The server merges maps monotonically, so resending them is
/// harmless and lets an earlier failed push catch up.
fn sync_patch(record: &OrderRecord, patch: &OrderPatch) -> OrderPatch {
    OrderPatch {
        user_id: record.user_id.clone(),
        status: patch.status,
        form: patch.form.clone(),
        prompts: Some(record.prompts.clone()),
        variations: Some(record.variations.clone()),
        selections: Some(record.selections.clone()),
    }
}

fn new_order(record: &OrderRecord) -> NewOrder {
    NewOrder {
        id: record.id.clone(),
        form: record.form.clone(),
        user_id: record.user_id.clone(),
    }
}

/// Run `op`, and once more if the first attempt fails.
async fn retry_once<T, F, Fut>(op: F) -> Result<T, HttpApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, HttpApiError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::debug!(error = %first, "Record service call failed, retrying once");
            op().await
        }
    }
}

impl PersistenceMirror {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RecordService>, events: EventBus) -> Self {
        Self {
            local,
            remote,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// Start a new draft order and make it the current one.
    pub async fn create(
        &self,
        form: OrderForm,
        user_id: Option<String>,
    ) -> OrchestratorResult<SaveOutcome> {
        let mut record = OrderRecord::new(OrderId::generate(), form, Utc::now());
        record.user_id = user_id;
        self.local.save(&record).await?;
        self.local.set_current_order(&record.id).await?;

        let order = new_order(&record);
        match retry_once(|| self.remote.create(&order)).await {
            Ok(remote) => {
                let record = self.fold_remote(&record.id, &remote).await?;
                Ok(SaveOutcome {
                    record,
                    synced: true,
                })
            }
            Err(e) => {
                self.degrade(&record.id, &e);
                Ok(SaveOutcome {
                    record,
                    synced: false,
                })
            }
        }
    }

    /// Load an order, reconciling the local and server copies. `None` when
    /// neither side knows the id.
    pub async fn load(&self, id: &OrderId) -> OrchestratorResult<Option<OrderRecord>> {
        let remote = match self.remote.fetch(id).await {
            Ok(remote) => remote,
            Err(e) => {
                self.degrade(id, &e);
                None
            }
        };

        let _guard = self.write_lock.lock().await;
        let local = self.local.load(id).await?;
        let merged = match (local, remote) {
            (Some(local), Some(remote)) => reconcile(&local, &remote),
            (Some(local), None) => local,
            (None, Some(remote)) => remote,
            (None, None) => return Ok(None),
        };
        self.local.save(&merged).await?;
        self.local.set_current_order(id).await?;
        Ok(Some(merged))
    }

    /// Merge `patch` into the local record, then push it to the server.
    pub async fn save(&self, id: &OrderId, patch: &OrderPatch) -> OrchestratorResult<SaveOutcome> {
        let record = {
            let _guard = self.write_lock.lock().await;
            let mut record = self.require_local(id).await?;
            record.apply_patch(patch, Utc::now())?;
            self.local.save(&record).await?;
            record
        };

        match self.push(&record, patch).await {
            Ok(remote) => {
                let record = self.fold_remote(id, &remote).await?;
                Ok(SaveOutcome {
                    record,
                    synced: true,
                })
            }
            Err(e) => {
                self.degrade(id, &e);
                Ok(SaveOutcome {
                    record,
                    synced: false,
                })
            }
        }
    }

    /// Clear one song's variations locally and on the server.
    pub async fn reset_song(&self, id: &OrderId, index: SongIndex) -> OrchestratorResult<SaveOutcome> {
        let record = {
            let _guard = self.write_lock.lock().await;
            let mut record = self.require_local(id).await?;
            record.reset_song(index, Utc::now())?;
            self.local.save(&record).await?;
            record
        };

        match retry_once(|| self.remote.reset_song(id, index)).await {
            Ok(remote) => {
                let record = self.fold_remote(id, &remote).await?;
                Ok(SaveOutcome {
                    record,
                    synced: true,
                })
            }
            Err(e) => {
                self.degrade(id, &e);
                Ok(SaveOutcome {
                    record,
                    synced: false,
                })
            }
        }
    }

    /// Fetch the server copy and fold whatever it holds into local storage.
    ///
    /// Used by the completion watcher on every tick, so partial results
    /// survive a reload even before a song completes.
    pub async fn poll(&self, id: &OrderId) -> OrchestratorResult<Option<OrderRecord>> {
        match self.remote.fetch(id).await? {
            Some(remote) => Ok(Some(self.fold_remote(id, &remote).await?)),
            None => Ok(self.local.load(id).await?),
        }
    }

    /// The local copy, without contacting the server.
    pub async fn local_record(&self, id: &OrderId) -> OrchestratorResult<Option<OrderRecord>> {
        Ok(self.local.load(id).await?)
    }

    pub async fn history(&self) -> OrchestratorResult<Vec<OrderId>> {
        Ok(self.local.history().await?)
    }

    pub async fn current_order(&self) -> OrchestratorResult<Option<OrderId>> {
        Ok(self.local.current_order().await?)
    }

    pub async fn set_current_order(&self, id: &OrderId) -> OrchestratorResult<()> {
        Ok(self.local.set_current_order(id).await?)
    }

    // ---- private helpers ----

    async fn require_local(&self, id: &OrderId) -> OrchestratorResult<OrderRecord> {
        Ok(self.local.load(id).await?.ok_or_else(|| CoreError::NotFound {
            entity: "Order",
            id: id.to_string(),
        })?)
    }

    /// Push a patch, recreating the server copy if it has gone missing.
    async fn push(&self, record: &OrderRecord, patch: &OrderPatch) -> Result<OrderRecord, HttpApiError> {
        let patch = sync_patch(record, patch);
        let patch = &patch;
        retry_once(|| async move {
            match self.remote.patch(&record.id, patch).await {
                Err(e) if e.status() == Some(404) => {
                    tracing::info!(order_id = %record.id, "Server record missing, recreating");
                    self.remote.create(&new_order(record)).await?;
                    self.remote.patch(&record.id, patch).await
                }
                other => other,
            }
        })
        .await
    }

    async fn fold_remote(&self, id: &OrderId, remote: &OrderRecord) -> OrchestratorResult<OrderRecord> {
        let _guard = self.write_lock.lock().await;
        let merged = match self.local.load(id).await? {
            Some(local) => reconcile(&local, remote),
            None => remote.clone(),
        };
        self.local.save(&merged).await?;
        Ok(merged)
    }

    fn degrade(&self, id: &OrderId, error: &HttpApiError) {
        tracing::warn!(order_id = %id, error = %error, "Record sync failed, continuing locally");
        self.events.publish(OrchestratorEvent::SyncDegraded {
            order_id: id.clone(),
            reason: error.to_string(),
        });
    }
}
