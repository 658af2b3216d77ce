//! In-memory collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use huggnote_core::error::CoreError;
use huggnote_core::order::{OrderForm, SenderInfo, SongSpec};
use huggnote_core::prompt::PromptInputs;
use huggnote_core::record::{NewOrder, OrderPatch, OrderRecord};
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::{VariationBook, VariationSlot};
use huggnote_musicgen::{CheckoutRequest, CheckoutSession, GenerateRequest, HttpApiError, PromptResponse};
use tokio::time::Instant;

use crate::config::Timings;
use crate::controller::{Orchestrator, Services};
use crate::events::EventBus;
use crate::mirror::PersistenceMirror;
use crate::record_client::RecordService;
use crate::services::{PaymentSessions, PromptBuilder, StaticIdentity, VariationGenerator};
use crate::store::{LocalStore, MemoryStore, StoreError};

pub fn sample_form(songs: usize) -> OrderForm {
    OrderForm {
        songs: (0..songs)
            .map(|i| SongSpec {
                recipient_name: format!("Recipient {i}"),
                mood: Some("warm".into()),
                ..Default::default()
            })
            .collect(),
        sender: SenderInfo {
            name: Some("Sam".into()),
            email: "sam@example.com".into(),
            phone: None,
            message: Some("With love".into()),
        },
        ..Default::default()
    }
}

pub fn sample_record(id: &str, songs: usize) -> OrderRecord {
    OrderRecord::new(OrderId::from(id), sample_form(songs), Utc::now())
}

fn api_error(status: u16, body: &str) -> HttpApiError {
    HttpApiError::ApiError {
        status,
        body: body.to_string(),
    }
}

/// Ordered log of collaborator calls, shared between fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<&'static str>>>);

impl Journal {
    pub fn push(&self, entry: &'static str) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Record service double with the same merge rules as the real one.
#[derive(Default)]
pub struct FakeRecords {
    records: Mutex<HashMap<OrderId, OrderRecord>>,
    offline: AtomicBool,
    /// Calls still to fail before the service recovers.
    failures: AtomicUsize,
    journal: Journal,
}

impl FakeRecords {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures.store(calls, Ordering::SeqCst);
    }

    pub fn insert(&self, record: OrderRecord) {
        self.records.lock().unwrap().insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &OrderId) {
        self.records.lock().unwrap().remove(id);
    }

    pub fn get(&self, id: &OrderId) -> Option<OrderRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    /// Simulate a webhook delivery for `task_id`.
    pub fn deliver(&self, task_id: &str, audio_url: Option<&str>, lyrics: Option<&str>) {
        let mut records = self.records.lock().unwrap();
        for record in records.values_mut() {
            let found = record
                .variations
                .submitted_tasks()
                .find(|(_, _, t)| *t == task_id)
                .map(|(song, variation, _)| (song, variation));
            if let Some((song, variation)) = found {
                let mut book = VariationBook::default();
                book.song_mut(song).slot_mut(variation).merge(&VariationSlot {
                    audio_url: audio_url.map(str::to_string),
                    lyrics: lyrics.map(str::to_string),
                    ..Default::default()
                });
                record.variations.merge_from(&book);
                return;
            }
        }
        panic!("no record holds task {task_id}");
    }

    fn check_online(&self) -> Result<(), HttpApiError> {
        let failing = self.offline.load(Ordering::SeqCst)
            || self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if failing {
            Err(api_error(503, "record service unavailable"))
        } else {
            Ok(())
        }
    }
}

fn to_api_error(err: CoreError) -> HttpApiError {
    match err {
        CoreError::Conflict(msg) => api_error(409, &msg),
        other => api_error(400, &other.to_string()),
    }
}

#[async_trait]
impl RecordService for FakeRecords {
    async fn fetch(&self, id: &OrderId) -> Result<Option<OrderRecord>, HttpApiError> {
        self.check_online()?;
        Ok(self.get(id))
    }

    async fn create(&self, order: &NewOrder) -> Result<OrderRecord, HttpApiError> {
        self.check_online()?;
        self.journal.push("create");
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&order.id) {
            return Err(api_error(409, "duplicate order id"));
        }
        let mut record = OrderRecord::new(order.id.clone(), order.form.clone(), Utc::now());
        record.user_id.clone_from(&order.user_id);
        records.insert(order.id.clone(), record.clone());
        Ok(record)
    }

    async fn patch(&self, id: &OrderId, patch: &OrderPatch) -> Result<OrderRecord, HttpApiError> {
        self.check_online()?;
        self.journal.push("patch");
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(id).ok_or_else(|| api_error(404, "no such order"))?;
        record.apply_patch(patch, Utc::now()).map_err(to_api_error)?;
        Ok(record.clone())
    }

    async fn reset_song(&self, id: &OrderId, index: SongIndex) -> Result<OrderRecord, HttpApiError> {
        self.check_online()?;
        self.journal.push("reset");
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(id).ok_or_else(|| api_error(404, "no such order"))?;
        record.reset_song(index, Utc::now()).map_err(to_api_error)?;
        Ok(record.clone())
    }
}

/// Memory store whose writes can be switched to fail, as on a full disk.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn load(&self, id: &OrderId) -> Result<Option<OrderRecord>, StoreError> {
        self.inner.load(id).await
    }

    async fn save(&self, record: &OrderRecord) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.save(record).await
    }

    async fn history(&self) -> Result<Vec<OrderId>, StoreError> {
        self.inner.history().await
    }

    async fn current_order(&self) -> Result<Option<OrderId>, StoreError> {
        self.inner.current_order().await
    }

    async fn set_current_order(&self, id: &OrderId) -> Result<(), StoreError> {
        self.inner.set_current_order(id).await
    }
}

/// Scripted outcome of one generation call.
pub enum Scripted {
    Task(&'static str),
    Status(u16),
}

/// Generation service double. Unscripted calls succeed with `task-N`.
#[derive(Default)]
pub struct FakeGenerator {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(GenerateRequest, Instant)>>,
    issued: AtomicUsize,
    journal: Journal,
}

impl FakeGenerator {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Scripted>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.calls.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }
}

#[async_trait]
impl VariationGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, HttpApiError> {
        self.calls.lock().unwrap().push((request.clone(), Instant::now()));
        self.journal.push("generate");
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Task(id)) => Ok(id.to_string()),
            Some(Scripted::Status(status)) => Err(api_error(status, "scripted failure")),
            None => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("task-{n}"))
            }
        }
    }
}

#[derive(Default)]
pub struct FakePrompts {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakePrompts {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PromptBuilder for FakePrompts {
    async fn build_prompt(&self, inputs: &PromptInputs) -> Result<PromptResponse, HttpApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(api_error(500, "prompt builder down"));
        }
        Ok(PromptResponse {
            success: true,
            prompt: Some(format!(
                "A {} song for {}",
                inputs.song.mood.as_deref().unwrap_or("heartfelt"),
                inputs.song.recipient_name
            )),
            music_style: Some("Acoustic Pop".into()),
        })
    }
}

#[derive(Default)]
pub struct FakePayments {
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl FakePayments {
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentSessions for FakePayments {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, HttpApiError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            url: format!("https://pay.example/{}", request.order_id),
        })
    }
}

/// One browser profile's worth of collaborators: a local store plus the
/// remote services it talks to.
pub struct Harness {
    pub local: Arc<MemoryStore>,
    pub records: Arc<FakeRecords>,
    pub generator: Arc<FakeGenerator>,
    pub prompts: Arc<FakePrompts>,
    pub payments: Arc<FakePayments>,
    pub journal: Journal,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        Self {
            local: Arc::new(MemoryStore::default()),
            records: Arc::new(FakeRecords::with_journal(journal.clone())),
            generator: Arc::new(FakeGenerator::with_journal(journal.clone())),
            prompts: Arc::new(FakePrompts::default()),
            payments: Arc::new(FakePayments::default()),
            journal,
        }
    }

    pub fn mirror(&self) -> Arc<PersistenceMirror> {
        Arc::new(PersistenceMirror::new(
            self.local.clone(),
            self.records.clone(),
            EventBus::default(),
        ))
    }

    /// A fresh orchestrator over this harness, as after a page load.
    pub fn orchestrator(&self, user: Option<&str>) -> Arc<Orchestrator> {
        self.orchestrator_over(self.local.clone(), user)
    }

    /// An orchestrator with its own local store sharing this harness's
    /// remote services, as in another browser or device.
    pub fn orchestrator_over(&self, local: Arc<dyn LocalStore>, user: Option<&str>) -> Arc<Orchestrator> {
        Orchestrator::new(
            Services {
                local,
                records: self.records.clone(),
                prompts: self.prompts.clone(),
                generator: self.generator.clone(),
                payments: self.payments.clone(),
                identity: Arc::new(StaticIdentity(user.map(str::to_string))),
            },
            Timings::default(),
        )
    }
}
