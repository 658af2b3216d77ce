//! Page-level controller.
//!
//! Each song of the open order has its own phase machine, keyed by song
//! index. Activating a song starts generation only when the order is
//! loaded, the song has not already been started in this session, and no
//! task ids are persisted for it; a song with persisted task ids resumes
//! watching instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use huggnote_core::error::CoreError;
use huggnote_core::order::{validate_order_form, OrderForm, OrderStatus};
use huggnote_core::phase::{PhaseEvent, SongPhase};
use huggnote_core::prompt::{CachedPrompt, PromptCache, PromptInputs};
use huggnote_core::record::{OrderPatch, OrderRecord};
use huggnote_core::selection::{check_checkout, resolve_task_ids, CheckoutBlocked, Selections};
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::VariationId;
use huggnote_musicgen::CheckoutRequest;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{EventBus, OrchestratorEvent};
use crate::mirror::PersistenceMirror;
use crate::record_client::RecordService;
use crate::requestor::{BatchReport, GenerationRequestor};
use crate::services::{IdentityProvider, PaymentSessions, PromptBuilder, VariationGenerator};
use crate::store::LocalStore;
use crate::watcher::{CompletionWatcher, WatchOutcome};

/// Collaborators the orchestrator runs against.
pub struct Services {
    pub local: Arc<dyn LocalStore>,
    pub records: Arc<dyn RecordService>,
    pub prompts: Arc<dyn PromptBuilder>,
    pub generator: Arc<dyn VariationGenerator>,
    pub payments: Arc<dyn PaymentSessions>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub struct Orchestrator {
    mirror: Arc<PersistenceMirror>,
    prompts: Arc<dyn PromptBuilder>,
    requestor: GenerationRequestor,
    watcher: CompletionWatcher,
    payments: Arc<dyn PaymentSessions>,
    identity: Arc<dyn IdentityProvider>,
    events: EventBus,
    timings: Timings,
    /// Master token; every song's token is a child of it.
    cancel: CancellationToken,
    session: RwLock<Session>,
}

#[derive(Default)]
struct Session {
    order_id: Option<OrderId>,
    songs: BTreeMap<SongIndex, SongControl>,
}

struct SongControl {
    phase: SongPhase,
    /// Set once generation or watching has been started for this song.
    started: bool,
    /// Bumped by every retry so stale tasks cannot move the new machine.
    epoch: u64,
    cancel: CancellationToken,
}

impl SongControl {
    fn new(cancel: CancellationToken, epoch: u64) -> Self {
        Self {
            phase: SongPhase::Idle,
            started: false,
            epoch,
            cancel,
        }
    }
}

/// What an activation decided to do once the phase was committed.
enum Launch {
    Generate,
    Watch,
}

impl Orchestrator {
    pub fn new(services: Services, timings: Timings) -> Arc<Self> {
        let events = EventBus::default();
        let mirror = Arc::new(PersistenceMirror::new(
            services.local,
            services.records,
            events.clone(),
        ));
        let requestor = GenerationRequestor::new(
            services.generator,
            mirror.clone(),
            events.clone(),
            timings.clone(),
        );
        let watcher = CompletionWatcher::new(mirror.clone(), events.clone(), timings.clone());

        Arc::new(Self {
            mirror,
            prompts: services.prompts,
            requestor,
            watcher,
            payments: services.payments,
            identity: services.identity,
            events,
            timings,
            cancel: CancellationToken::new(),
            session: RwLock::new(Session::default()),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub async fn order_id(&self) -> Option<OrderId> {
        self.session.read().await.order_id.clone()
    }

    pub async fn phase(&self, index: SongIndex) -> SongPhase {
        self.session
            .read()
            .await
            .songs
            .get(&index)
            .map(|c| c.phase.clone())
            .unwrap_or_default()
    }

    /// Latest local copy of the open order.
    pub async fn record(&self) -> OrchestratorResult<OrderRecord> {
        let id = self.order_id().await.ok_or(OrchestratorError::NotLoaded)?;
        self.mirror
            .local_record(&id)
            .await?
            .ok_or(OrchestratorError::NotLoaded)
    }

    pub async fn history(&self) -> OrchestratorResult<Vec<OrderId>> {
        self.mirror.history().await
    }

    /// Submit a new order form and open it.
    pub async fn start_order(&self, form: OrderForm) -> OrchestratorResult<OrderRecord> {
        validate_order_form(&form)?;
        let user = self.identity.current_user().await;
        let outcome = self.mirror.create(form, user).await?;
        tracing::info!(
            order_id = %outcome.record.id,
            songs = outcome.record.song_count(),
            synced = outcome.synced,
            "Order started",
        );
        self.adopt(&outcome.record).await;
        Ok(outcome.record)
    }

    /// Open an existing order. Reopening the order already open keeps the
    /// per-song state of this session.
    pub async fn open(&self, id: &OrderId) -> OrchestratorResult<OrderRecord> {
        let record = self.mirror.load(id).await?.ok_or_else(|| CoreError::NotFound {
            entity: "Order",
            id: id.to_string(),
        })?;
        let record = self.associate_identity(record).await?;
        self.adopt(&record).await;
        Ok(record)
    }

    /// Reopen whichever order the local store marks as current.
    pub async fn resume(&self) -> OrchestratorResult<Option<OrderRecord>> {
        match self.mirror.current_order().await? {
            Some(id) => Ok(Some(self.open(&id).await?)),
            None => Ok(None),
        }
    }

    /// Run the eligibility check for one song and start whatever it needs.
    pub async fn activate_song(self: &Arc<Self>, index: SongIndex) -> OrchestratorResult<SongPhase> {
        let record = self.record().await?;
        if usize::from(index) >= record.song_count() {
            return Err(OrchestratorError::UnknownSong(index));
        }
        // Another session may have submitted this song since the order was
        // opened.
        let record = self.refreshed(record).await;
        let song = record.variations.song(index).cloned().unwrap_or_default();

        let mut session = self.session.write().await;
        if session.order_id.as_ref() != Some(&record.id) {
            return Err(OrchestratorError::NotLoaded);
        }
        let master = &self.cancel;
        let control = session
            .songs
            .entry(index)
            .or_insert_with(|| SongControl::new(master.child_token(), 0));

        if control.started || control.phase != SongPhase::Idle {
            tracing::debug!(
                order_id = %record.id,
                song_index = index,
                phase = control.phase.name(),
                "Song already active",
            );
            return Ok(control.phase.clone());
        }

        let (event, launch) = if song.is_complete() {
            (PhaseEvent::Completed, None)
        } else if song.has_task_ids() {
            (PhaseEvent::Resume, Some(Launch::Watch))
        } else if song.all_failed() {
            (
                PhaseEvent::Fail("Every variation failed to start. Retry to generate again.".into()),
                None,
            )
        } else {
            (PhaseEvent::StartGeneration, Some(Launch::Generate))
        };

        control.phase = control.phase.apply(event)?;
        control.started = true;
        let phase = control.phase.clone();
        let epoch = control.epoch;
        let cancel = control.cancel.clone();
        drop(session);

        self.publish_phase(&record.id, index, &phase);

        let this = Arc::clone(self);
        let order_id = record.id.clone();
        match launch {
            Some(Launch::Generate) => {
                tokio::spawn(async move { this.run_generation(order_id, index, epoch, cancel).await });
            }
            Some(Launch::Watch) => {
                tokio::spawn(async move { this.run_watch(order_id, index, epoch, cancel).await });
            }
            None => {}
        }
        Ok(phase)
    }

    /// Manual retry from the error phase: clear the song's variations and
    /// run the machine again from `Idle`.
    pub async fn retry_song(self: &Arc<Self>, index: SongIndex) -> OrchestratorResult<SongPhase> {
        let order_id = self.order_id().await.ok_or(OrchestratorError::NotLoaded)?;
        let epoch = {
            let mut session = self.session.write().await;
            let control = session
                .songs
                .get_mut(&index)
                .ok_or(OrchestratorError::UnknownSong(index))?;
            if !matches!(control.phase, SongPhase::Error(_)) {
                return Err(CoreError::Conflict(format!(
                    "Song {index} is {} and cannot be retried",
                    control.phase.name()
                ))
                .into());
            }
            control.cancel.cancel();
            let mut fresh = SongControl::new(self.cancel.child_token(), control.epoch + 1);
            fresh.phase = control.phase.apply(PhaseEvent::Reset)?;
            // Held until the reset is persisted so a concurrent activation
            // cannot resume from the old task ids.
            fresh.started = true;
            *control = fresh;
            control.epoch
        };
        self.publish_phase(&order_id, index, &SongPhase::Idle);

        tracing::info!(order_id = %order_id, song_index = index, "Retrying song");
        if let Err(e) = self.mirror.reset_song(&order_id, index).await {
            tracing::warn!(order_id = %order_id, song_index = index, error = %e, "Song reset failed");
            let restored = {
                let mut session = self.session.write().await;
                match session.songs.get_mut(&index) {
                    Some(control) if control.epoch == epoch => {
                        control.phase = SongPhase::Error(format!("Retry failed: {e}"));
                        Some(control.phase.clone())
                    }
                    _ => None,
                }
            };
            if let Some(phase) = restored {
                self.publish_phase(&order_id, index, &phase);
            }
            return Err(e);
        }

        {
            let mut session = self.session.write().await;
            if let Some(control) = session.songs.get_mut(&index) {
                if control.epoch == epoch {
                    control.started = false;
                }
            }
        }
        self.activate_song(index).await
    }

    /// Choose a variation for a song, replacing any earlier choice.
    pub async fn select(&self, index: SongIndex, variation: VariationId) -> OrchestratorResult<()> {
        let record = self.record().await?;
        if usize::from(index) >= record.song_count() {
            return Err(OrchestratorError::UnknownSong(index));
        }
        let mut selections = Selections::default();
        selections.select(index, variation);
        let patch = OrderPatch {
            selections: Some(selections),
            ..Default::default()
        };
        self.mirror.save(&record.id, &patch).await?;
        tracing::debug!(order_id = %record.id, song_index = index, variation_id = %variation, "Variation selected");
        Ok(())
    }

    /// Every song has a selection and a signed-in user owns the order.
    pub async fn can_checkout(&self) -> bool {
        self.checkout_gate().await.is_ok()
    }

    /// Hand the selections to the payment service and return the URL to
    /// redirect to. Missing selections are rejected before any network call.
    pub async fn checkout(&self) -> OrchestratorResult<String> {
        let (record, user_id) = self.checkout_gate().await?;
        let task_ids = resolve_task_ids(&record.selections, &record.variations)?;

        if record.user_id.is_none() {
            let patch = OrderPatch {
                user_id: Some(user_id),
                ..Default::default()
            };
            self.mirror.save(&record.id, &patch).await?;
        }

        let request = CheckoutRequest {
            order_id: record.id.clone(),
            selections: record.selections.clone(),
            task_ids,
        };
        let session = self.payments.create_session(&request).await?;

        let patch = OrderPatch {
            status: Some(OrderStatus::AwaitingPayment),
            ..Default::default()
        };
        if let Err(e) = self.mirror.save(&record.id, &patch).await {
            tracing::warn!(order_id = %record.id, error = %e, "Failed to mark order awaiting payment");
        }

        tracing::info!(order_id = %record.id, "Checkout session ready");
        Ok(session.url)
    }

    /// Wait until every song of the open order is ready or failed.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.subscribe();
        loop {
            if self.is_settled().await {
                return;
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Stop every running generation and watch.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.cancel.cancel();
    }

    // ---- private helpers ----

    async fn is_settled(&self) -> bool {
        let session = self.session.read().await;
        !session.songs.is_empty()
            && session
                .songs
                .values()
                .all(|c| matches!(c.phase, SongPhase::Ready | SongPhase::Error(_)))
    }

    /// Make `record` the open order, creating a phase machine per song.
    async fn adopt(&self, record: &OrderRecord) {
        let mut session = self.session.write().await;
        if session.order_id.as_ref() != Some(&record.id) {
            for control in session.songs.values() {
                control.cancel.cancel();
            }
            session.songs.clear();
            session.order_id = Some(record.id.clone());
        }
        for index in 0..record.song_count() {
            let Ok(index) = SongIndex::try_from(index) else {
                continue;
            };
            let master = &self.cancel;
            session
                .songs
                .entry(index)
                .or_insert_with(|| SongControl::new(master.child_token(), 0));
        }
    }

    /// Attach the signed-in user to an order that has no owner yet.
    async fn associate_identity(&self, record: OrderRecord) -> OrchestratorResult<OrderRecord> {
        if record.user_id.is_some() || record.status.is_final() {
            return Ok(record);
        }
        let Some(user_id) = self.identity.current_user().await else {
            return Ok(record);
        };
        tracing::info!(order_id = %record.id, user_id = %user_id, "Associating order with user");
        let patch = OrderPatch {
            user_id: Some(user_id),
            ..Default::default()
        };
        Ok(self.mirror.save(&record.id, &patch).await?.record)
    }

    /// Fold the server copy into `local`, keeping `local` when the server
    /// cannot be reached.
    async fn refreshed(&self, local: OrderRecord) -> OrderRecord {
        match self.mirror.poll(&local.id).await {
            Ok(Some(record)) => record,
            Ok(None) => local,
            Err(e) => {
                tracing::debug!(order_id = %local.id, error = %e, "Record refresh failed, using local copy");
                local
            }
        }
    }

    async fn checkout_gate(&self) -> OrchestratorResult<(OrderRecord, String)> {
        let record = self.record().await?;
        let user_id = match record.user_id.clone() {
            Some(user) => Some(user),
            None => self.identity.current_user().await,
        };
        check_checkout(record.song_count(), &record.selections, user_id.as_deref())?;
        let user_id = user_id.ok_or(CheckoutBlocked::NotAuthenticated)?;
        Ok((record, user_id))
    }

    fn publish_phase(&self, order_id: &OrderId, index: SongIndex, phase: &SongPhase) {
        tracing::info!(order_id = %order_id, song_index = index, phase = phase.name(), "Song phase changed");
        self.events.publish(OrchestratorEvent::PhaseChanged {
            order_id: order_id.clone(),
            song_index: index,
            phase: phase.clone(),
        });
    }

    /// Apply `event` to the song's machine if it still belongs to `epoch`.
    async fn advance(&self, order_id: &OrderId, index: SongIndex, epoch: u64, event: PhaseEvent) {
        let phase = {
            let mut session = self.session.write().await;
            if session.order_id.as_ref() != Some(order_id) {
                return;
            }
            let Some(control) = session.songs.get_mut(&index) else {
                return;
            };
            if control.epoch != epoch {
                return;
            }
            match control.phase.apply(event) {
                Ok(next) => {
                    control.phase = next.clone();
                    next
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, song_index = index, error = %e, "Ignored phase event");
                    return;
                }
            }
        };
        self.publish_phase(order_id, index, &phase);
    }

    async fn run_generation(
        self: Arc<Self>,
        order_id: OrderId,
        index: SongIndex,
        epoch: u64,
        cancel: CancellationToken,
    ) {
        let report = match self.generate_batch(&order_id, index).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(order_id = %order_id, song_index = index, error = %e, "Generation batch failed");
                self.advance(&order_id, index, epoch, PhaseEvent::Fail(e.to_string())).await;
                return;
            }
        };

        self.advance(&order_id, index, epoch, PhaseEvent::BatchIssued).await;
        if report.all_failed() {
            let reason = OrchestratorError::GenerationFailed {
                song_index: index,
                reason: "every variation request failed".into(),
            };
            self.advance(&order_id, index, epoch, PhaseEvent::Fail(reason.to_string())).await;
            return;
        }
        if cancel.is_cancelled() {
            return;
        }
        self.run_watch(order_id, index, epoch, cancel).await;
    }

    async fn run_watch(&self, order_id: OrderId, index: SongIndex, epoch: u64, cancel: CancellationToken) {
        let handle = self.watcher.start(order_id.clone(), index, cancel.child_token());
        match handle.join().await {
            WatchOutcome::Ready(_) => {
                self.advance(&order_id, index, epoch, PhaseEvent::Completed).await;
            }
            WatchOutcome::TimedOut => {
                let reason = OrchestratorError::WatchTimeout {
                    song_index: index,
                    waited_secs: self.timings.watch_timeout.as_secs(),
                };
                self.advance(&order_id, index, epoch, PhaseEvent::Fail(reason.to_string())).await;
            }
            WatchOutcome::Stopped => {}
        }
    }

    /// Reuse or build the song's prompt, then request its variations.
    async fn generate_batch(&self, order_id: &OrderId, index: SongIndex) -> OrchestratorResult<BatchReport> {
        let record = self.record().await?;
        let inputs = PromptInputs::from_form(&record.form, index)
            .ok_or(OrchestratorError::UnknownSong(index))?;
        let voice_hint = inputs.song.voice.clone();

        let prompt = match record.prompts.lookup(index, &inputs) {
            Some(cached) => {
                tracing::debug!(order_id = %order_id, song_index = index, "Reusing cached prompt");
                cached.clone()
            }
            None => self.build_prompt(order_id, index, inputs).await?,
        };

        self.requestor
            .request_batch(order_id, index, &prompt, voice_hint)
            .await
    }

    async fn build_prompt(
        &self,
        order_id: &OrderId,
        index: SongIndex,
        inputs: PromptInputs,
    ) -> OrchestratorResult<CachedPrompt> {
        let response = self.prompts.build_prompt(&inputs).await.map_err(|e| {
            OrchestratorError::GenerationFailed {
                song_index: index,
                reason: format!("prompt builder failed: {e}"),
            }
        })?;
        let prompt = response.prompt.ok_or_else(|| OrchestratorError::GenerationFailed {
            song_index: index,
            reason: "prompt builder returned no prompt".into(),
        })?;
        let cached = CachedPrompt {
            inputs,
            prompt,
            music_style: response.music_style,
        };

        let mut prompts = PromptCache::default();
        prompts.insert(index, cached.clone());
        let patch = OrderPatch {
            prompts: Some(prompts),
            ..Default::default()
        };
        self.mirror.save(order_id, &patch).await?;
        Ok(cached)
    }
}
