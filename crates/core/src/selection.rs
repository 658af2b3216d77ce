//! The customer's chosen variation per song, and checkout gating.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SongIndex;
use crate::variation::{VariationBook, VariationId};

/// Song index -> chosen variation. Re-selecting overwrites; no history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selections(BTreeMap<SongIndex, VariationId>);

impl Selections {
    pub fn select(&mut self, index: SongIndex, variation: VariationId) {
        self.0.insert(index, variation);
    }

    pub fn get(&self, index: SongIndex) -> Option<VariationId> {
        self.0.get(&index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SongIndex, VariationId)> + '_ {
        self.0.iter().map(|(i, v)| (*i, *v))
    }

    pub fn clear_song(&mut self, index: SongIndex) {
        self.0.remove(&index);
    }

    /// Indices in `[0, song_count)` with no selection.
    pub fn missing(&self, song_count: usize) -> Vec<SongIndex> {
        (0..song_count)
            .filter_map(|i| SongIndex::try_from(i).ok())
            .filter(|i| !self.0.contains_key(i))
            .collect()
    }

    pub fn is_complete(&self, song_count: usize) -> bool {
        self.missing(song_count).is_empty()
    }
}

/// Why checkout cannot start yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutBlocked {
    #[error("missing selection for songs {0:?}")]
    MissingSelection(Vec<SongIndex>),

    #[error("sign in to continue to checkout")]
    NotAuthenticated,
}

/// Checkout may start only when every song has a selection and the order
/// belongs to a signed-in user.
pub fn check_checkout(
    song_count: usize,
    selections: &Selections,
    user_id: Option<&str>,
) -> Result<(), CheckoutBlocked> {
    let missing = selections.missing(song_count);
    if !missing.is_empty() {
        return Err(CheckoutBlocked::MissingSelection(missing));
    }
    if user_id.is_none() {
        return Err(CheckoutBlocked::NotAuthenticated);
    }
    Ok(())
}

/// Resolve every selection to the task id behind it.
pub fn resolve_task_ids(
    selections: &Selections,
    book: &VariationBook,
) -> Result<BTreeMap<SongIndex, String>, CoreError> {
    selections
        .iter()
        .map(|(index, variation)| {
            book.song(index)
                .and_then(|song| song.task_id_for(variation))
                .map(|task| (index, task.to_string()))
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Song {index} variation {variation} has no task id"
                    ))
                })
        })
        .collect()
}
