//! Domain errors shared by the record service and the orchestrator.

use crate::types::SongIndex;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// An order form or patch that breaks an order rule.
    #[error("Invalid order: {0}")]
    Validation(String),

    /// A change the record's current state does not allow, such as editing
    /// a paid order or an illegal phase transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data that no longer decodes into domain types.
    #[error("Corrupt {entity} {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("Song index {0} is outside the order")]
    SongOutOfRange(SongIndex),
}
