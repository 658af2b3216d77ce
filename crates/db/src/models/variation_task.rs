//! Task id index rows.

use huggnote_core::error::CoreError;
use huggnote_core::types::{SongIndex, Timestamp};
use huggnote_core::variation::VariationId;
use serde::Serialize;
use sqlx::FromRow;

/// Maps an external task id back to the slot it was requested for.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VariationTask {
    pub task_id: String,
    pub order_id: String,
    pub song_index: i16,
    pub variation_id: i16,
    pub created_at: Timestamp,
}

impl VariationTask {
    /// Typed `(song, variation)` for this row.
    pub fn slot(&self) -> Result<(SongIndex, VariationId), CoreError> {
        let corrupt = |reason: String| CoreError::Corrupt {
            entity: "Task",
            id: self.task_id.clone(),
            reason,
        };
        let song = SongIndex::try_from(self.song_index)
            .map_err(|_| corrupt(format!("song index {}", self.song_index)))?;
        let variation = u8::try_from(self.variation_id)
            .ok()
            .and_then(|id| VariationId::new(id).ok())
            .ok_or_else(|| corrupt(format!("variation id {}", self.variation_id)))?;
        Ok((song, variation))
    }
}
