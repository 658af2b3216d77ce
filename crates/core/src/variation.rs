//! Typed variation maps: song index -> variation id -> slot.
//!
//! A slot's task handle only ever moves up the lattice
//! `NotRequested < Failed < Submitted`, and a submitted task id is never
//! replaced. Audio, lyrics and style take incoming values and keep what is
//! already held when the incoming side has nothing. The one way to clear a
//! song is [`VariationBook::reset_song`], used by the manual retry action.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SongIndex;

/// Variations generated for every song.
pub const VARIATIONS_PER_SONG: u8 = 3;

/// One-based variation id, always in `1..=VARIATIONS_PER_SONG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VariationId(u8);

impl VariationId {
    pub fn new(id: u8) -> Result<Self, CoreError> {
        if (1..=VARIATIONS_PER_SONG).contains(&id) {
            Ok(Self(id))
        } else {
            Err(CoreError::Validation(format!(
                "Variation id {id} is outside 1..={VARIATIONS_PER_SONG}"
            )))
        }
    }

    /// All variation ids in request order.
    pub fn all() -> impl Iterator<Item = VariationId> {
        (1..=VARIATIONS_PER_SONG).map(VariationId)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_last(self) -> bool {
        self.0 == VARIATIONS_PER_SONG
    }
}

impl TryFrom<u8> for VariationId {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        VariationId::new(value)
    }
}

impl From<VariationId> for u8 {
    fn from(value: VariationId) -> Self {
        value.0
    }
}

impl fmt::Display for VariationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of requesting one variation from the generation service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskSlot {
    /// Never attempted, or cleared by a reset.
    #[default]
    NotRequested,
    /// Both attempts failed; not retried for this batch.
    Failed,
    /// Accepted by the generation service.
    Submitted { task_id: String },
}

impl TaskSlot {
    fn rank(&self) -> u8 {
        match self {
            TaskSlot::NotRequested => 0,
            TaskSlot::Failed => 1,
            TaskSlot::Submitted { .. } => 2,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            TaskSlot::Submitted { task_id } => Some(task_id),
            _ => None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, TaskSlot::Submitted { .. })
    }

    /// Merge `incoming` into `self`, never moving down the lattice.
    pub fn merge(&mut self, incoming: &TaskSlot) {
        if self.is_submitted() {
            return;
        }
        if incoming.rank() > self.rank() {
            *self = incoming.clone();
        }
    }
}

/// Everything known about one variation of one song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationSlot {
    #[serde(default)]
    pub task: TaskSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    /// Display style label, e.g. `"Acoustic Pop"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl VariationSlot {
    /// Ready means audio is present. Lyrics may arrive earlier or not at all.
    pub fn is_ready(&self) -> bool {
        self.audio_url.is_some()
    }

    pub fn merge(&mut self, incoming: &VariationSlot) {
        self.task.merge(&incoming.task);
        if incoming.audio_url.is_some() {
            self.audio_url.clone_from(&incoming.audio_url);
        }
        if incoming.lyrics.is_some() {
            self.lyrics.clone_from(&incoming.lyrics);
        }
        if incoming.style.is_some() {
            self.style.clone_from(&incoming.style);
        }
    }
}

/// The three variation slots of one song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongVariations(BTreeMap<VariationId, VariationSlot>);

impl SongVariations {
    pub fn get(&self, id: VariationId) -> Option<&VariationSlot> {
        self.0.get(&id)
    }

    pub fn slot_mut(&mut self, id: VariationId) -> &mut VariationSlot {
        self.0.entry(id).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariationId, &VariationSlot)> {
        self.0.iter().map(|(id, slot)| (*id, slot))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn task_id_for(&self, id: VariationId) -> Option<&str> {
        self.0.get(&id).and_then(|slot| slot.task.task_id())
    }

    /// Number of variations the watcher waits for: submitted slots only.
    pub fn expected_count(&self) -> usize {
        self.0.values().filter(|s| s.task.is_submitted()).count()
    }

    /// Number of variations whose audio has arrived.
    pub fn received_count(&self) -> usize {
        self.0.values().filter(|s| s.is_ready()).count()
    }

    /// Every submitted variation has audio, and at least one was submitted.
    pub fn is_complete(&self) -> bool {
        let expected = self.expected_count();
        expected > 0 && self.received_count() >= expected
    }

    /// Any task id present. Used as the idempotency key for generation.
    pub fn has_task_ids(&self) -> bool {
        self.0.values().any(|s| s.task.is_submitted())
    }

    /// Every variation was attempted and every attempt failed.
    pub fn all_failed(&self) -> bool {
        VariationId::all().all(|id| matches!(self.0.get(&id), Some(s) if s.task == TaskSlot::Failed))
    }

    pub fn merge_from(&mut self, other: &SongVariations) {
        for (id, incoming) in &other.0 {
            self.slot_mut(*id).merge(incoming);
        }
    }
}

/// All variation slots of an order, keyed by song index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariationBook(BTreeMap<SongIndex, SongVariations>);

impl VariationBook {
    pub fn song(&self, index: SongIndex) -> Option<&SongVariations> {
        self.0.get(&index)
    }

    pub fn song_mut(&mut self, index: SongIndex) -> &mut SongVariations {
        self.0.entry(index).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SongIndex, &SongVariations)> {
        self.0.iter().map(|(i, s)| (*i, s))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(SongVariations::is_empty)
    }

    pub fn has_task_ids(&self, index: SongIndex) -> bool {
        self.song(index).is_some_and(SongVariations::has_task_ids)
    }

    /// Record the outcome of one variation request.
    pub fn record_task(&mut self, index: SongIndex, id: VariationId, task: TaskSlot, style: Option<String>) {
        let slot = self.song_mut(index).slot_mut(id);
        slot.task.merge(&task);
        if style.is_some() {
            slot.style = style;
        }
    }

    /// Drop every slot of a song. The only operation that removes task ids.
    pub fn reset_song(&mut self, index: SongIndex) -> Option<SongVariations> {
        self.0.remove(&index)
    }

    pub fn merge_from(&mut self, other: &VariationBook) {
        for (index, incoming) in &other.0 {
            self.song_mut(*index).merge_from(incoming);
        }
    }

    /// Every submitted task, as `(song, variation, task_id)`.
    pub fn submitted_tasks(&self) -> impl Iterator<Item = (SongIndex, VariationId, &str)> {
        self.0.iter().flat_map(|(index, song)| {
            song.iter()
                .filter_map(move |(id, slot)| slot.task.task_id().map(|t| (*index, id, t)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u8) -> VariationId {
        VariationId::new(id).unwrap()
    }

    fn submitted(task: &str) -> TaskSlot {
        TaskSlot::Submitted {
            task_id: task.to_string(),
        }
    }

    #[test]
    fn variation_id_rejects_out_of_range() {
        assert!(VariationId::new(0).is_err());
        assert!(VariationId::new(4).is_err());
        assert_eq!(VariationId::all().map(VariationId::get).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn submitted_task_is_never_replaced() {
        let mut slot = submitted("t1");
        slot.merge(&submitted("t9"));
        slot.merge(&TaskSlot::Failed);
        slot.merge(&TaskSlot::NotRequested);
        assert_eq!(slot.task_id(), Some("t1"));
    }

    #[test]
    fn failed_upgrades_to_submitted_but_not_back() {
        let mut slot = TaskSlot::Failed;
        slot.merge(&TaskSlot::NotRequested);
        assert_eq!(slot, TaskSlot::Failed);
        slot.merge(&submitted("t2"));
        assert_eq!(slot.task_id(), Some("t2"));
    }

    #[test]
    fn slot_merge_keeps_existing_audio_when_incoming_is_empty() {
        let mut slot = VariationSlot {
            task: submitted("t1"),
            audio_url: Some("https://cdn/a.mp3".into()),
            lyrics: None,
            style: Some("Pop".into()),
        };
        slot.merge(&VariationSlot {
            lyrics: Some("la la".into()),
            ..Default::default()
        });
        assert_eq!(slot.audio_url.as_deref(), Some("https://cdn/a.mp3"));
        assert_eq!(slot.lyrics.as_deref(), Some("la la"));
        assert_eq!(slot.style.as_deref(), Some("Pop"));
        assert!(slot.is_ready());
    }

    #[test]
    fn lyrics_alone_do_not_make_a_slot_ready() {
        let slot = VariationSlot {
            task: submitted("t1"),
            lyrics: Some("words".into()),
            ..Default::default()
        };
        assert!(!slot.is_ready());
    }

    #[test]
    fn failed_variation_is_excluded_from_expected_count() {
        let mut book = VariationBook::default();
        book.record_task(0, v(1), submitted("t1"), None);
        book.record_task(0, v(2), TaskSlot::Failed, None);
        book.record_task(0, v(3), submitted("t3"), None);

        let song = book.song_mut(0);
        assert_eq!(song.expected_count(), 2);
        song.slot_mut(v(1)).audio_url = Some("a1".into());
        assert!(!song.is_complete());
        song.slot_mut(v(3)).audio_url = Some("a3".into());
        assert!(song.is_complete());
    }

    #[test]
    fn empty_song_is_never_complete() {
        assert!(!SongVariations::default().is_complete());
    }

    #[test]
    fn all_failed_requires_every_variation() {
        let mut song = SongVariations::default();
        song.slot_mut(v(1)).task = TaskSlot::Failed;
        song.slot_mut(v(2)).task = TaskSlot::Failed;
        assert!(!song.all_failed());
        song.slot_mut(v(3)).task = TaskSlot::Failed;
        assert!(song.all_failed());
    }

    #[test]
    fn book_merge_is_per_slot() {
        let mut local = VariationBook::default();
        local.record_task(0, v(1), submitted("t1"), Some("Pop".into()));

        let mut remote = VariationBook::default();
        remote.record_task(0, v(1), submitted("other"), None);
        remote.song_mut(0).slot_mut(v(1)).audio_url = Some("a1".into());
        remote.record_task(1, v(2), submitted("t5"), None);

        local.merge_from(&remote);
        let slot = local.song(0).unwrap().get(v(1)).unwrap();
        assert_eq!(slot.task.task_id(), Some("t1"));
        assert_eq!(slot.audio_url.as_deref(), Some("a1"));
        assert!(local.has_task_ids(1));
        assert_eq!(local.submitted_tasks().count(), 2);
    }

    #[test]
    fn reset_song_clears_only_that_song() {
        let mut book = VariationBook::default();
        book.record_task(0, v(1), submitted("t1"), None);
        book.record_task(1, v(1), submitted("t4"), None);
        book.reset_song(0);
        assert!(!book.has_task_ids(0));
        assert!(book.has_task_ids(1));
    }

    #[test]
    fn serializes_with_integer_keys() {
        let mut book = VariationBook::default();
        book.record_task(2, v(3), submitted("abc"), None);
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["2"]["3"]["task"]["status"], "submitted");
        assert_eq!(json["2"]["3"]["task"]["task_id"], "abc");

        let back: VariationBook = serde_json::from_value(json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn out_of_range_variation_key_fails_to_parse() {
        let json = serde_json::json!({ "0": { "7": { "task": { "status": "failed" } } } });
        assert!(serde_json::from_value::<VariationBook>(json).is_err());
    }
}
