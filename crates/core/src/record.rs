//! The order record: the synchronization point shared by the client-side
//! mirror and the server-side record service.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::order::{OrderForm, OrderStatus};
use crate::prompt::PromptCache;
use crate::selection::Selections;
use crate::types::{OrderId, SongIndex, Timestamp};
use crate::variation::VariationBook;

/// Full persisted state of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    pub form: OrderForm,
    #[serde(default)]
    pub prompts: PromptCache,
    #[serde(default)]
    pub variations: VariationBook,
    #[serde(default)]
    pub selections: Selections,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Partial update. Absent fields are left untouched; nested maps merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<OrderForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptCache>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<VariationBook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<Selections>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self == &OrderPatch::default()
    }
}

/// Payload for creating a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub id: OrderId,
    pub form: OrderForm,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl OrderRecord {
    /// A fresh draft record, as created on first form submission.
    pub fn new(id: OrderId, form: OrderForm, now: Timestamp) -> Self {
        Self {
            id,
            user_id: None,
            status: OrderStatus::Draft,
            form,
            prompts: PromptCache::default(),
            variations: VariationBook::default(),
            selections: Selections::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn song_count(&self) -> usize {
        self.form.song_count()
    }

    /// Merge a patch into this record.
    ///
    /// Scalars replace, the form replaces, prompts merge per song,
    /// variations merge per slot, selections merge per song. A paid record
    /// is immutable.
    pub fn apply_patch(&mut self, patch: &OrderPatch, now: Timestamp) -> Result<(), CoreError> {
        if self.status.is_final() {
            return Err(CoreError::Conflict(format!(
                "Order {} is paid and can no longer change",
                self.id
            )));
        }
        if let Some(user_id) = &patch.user_id {
            self.user_id = Some(user_id.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(form) = &patch.form {
            self.form = form.clone();
        }
        if let Some(prompts) = &patch.prompts {
            self.prompts.merge_from(prompts);
        }
        if let Some(variations) = &patch.variations {
            self.variations.merge_from(variations);
        }
        if let Some(selections) = &patch.selections {
            for (index, variation) in selections.iter() {
                self.selections.select(index, variation);
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Clear one song's variations and selection ahead of a manual retry.
    pub fn reset_song(&mut self, index: SongIndex, now: Timestamp) -> Result<(), CoreError> {
        if self.status.is_final() {
            return Err(CoreError::Conflict(format!(
                "Order {} is paid and can no longer change",
                self.id
            )));
        }
        self.variations.reset_song(index);
        self.selections.clear_song(index);
        self.updated_at = now;
        Ok(())
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id.clone(),
            status: self.status,
            song_count: self.song_count(),
            recipients: self
                .form
                .songs
                .iter()
                .map(|s| s.recipient_name.clone())
                .collect(),
            created_at: self.created_at,
        }
    }
}

/// Compact listing entry for history and library views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub song_count: usize,
    pub recipients: Vec<String>,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::order::{SenderInfo, SongSpec};
    use crate::variation::{TaskSlot, VariationId};

    fn record() -> OrderRecord {
        let form = OrderForm {
            songs: vec![SongSpec {
                recipient_name: "Ana".into(),
                ..Default::default()
            }],
            sender: SenderInfo {
                email: "x@y.com".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        OrderRecord::new(OrderId::from("order-1"), form, Utc::now())
    }

    fn v(id: u8) -> VariationId {
        VariationId::new(id).unwrap()
    }

    #[test]
    fn patch_merges_variations_without_dropping_task_ids() {
        let mut rec = record();
        let mut first = VariationBook::default();
        first.record_task(0, v(1), TaskSlot::Submitted { task_id: "t1".into() }, None);
        rec.apply_patch(
            &OrderPatch {
                variations: Some(first),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        let mut second = VariationBook::default();
        second.record_task(0, v(1), TaskSlot::NotRequested, None);
        second.record_task(0, v(2), TaskSlot::Submitted { task_id: "t2".into() }, None);
        rec.apply_patch(
            &OrderPatch {
                variations: Some(second),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        let song = rec.variations.song(0).unwrap();
        assert_eq!(song.task_id_for(v(1)), Some("t1"));
        assert_eq!(song.task_id_for(v(2)), Some("t2"));
    }

    #[test]
    fn paid_record_rejects_patches() {
        let mut rec = record();
        rec.status = OrderStatus::Paid;
        assert_matches!(
            rec.apply_patch(&OrderPatch::default(), Utc::now()),
            Err(CoreError::Conflict(_))
        );
        assert_matches!(rec.reset_song(0, Utc::now()), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn reset_song_clears_selection_too() {
        let mut rec = record();
        rec.variations
            .record_task(0, v(1), TaskSlot::Submitted { task_id: "t1".into() }, None);
        rec.selections.select(0, v(1));
        rec.reset_song(0, Utc::now()).unwrap();
        assert!(!rec.variations.has_task_ids(0));
        assert_eq!(rec.selections.get(0), None);
    }

    #[test]
    fn empty_patch_serializes_to_empty_object() {
        assert_eq!(serde_json::to_string(&OrderPatch::default()).unwrap(), "{}");
        assert!(OrderPatch::default().is_empty());
    }

    #[test]
    fn summary_lists_recipients() {
        let s = record().summary();
        assert_eq!(s.song_count, 1);
        assert_eq!(s.recipients, vec!["Ana".to_string()]);
    }
}
