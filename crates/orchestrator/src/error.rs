use huggnote_core::error::CoreError;
use huggnote_core::selection::CheckoutBlocked;
use huggnote_core::types::SongIndex;
use huggnote_musicgen::HttpApiError;

use crate::store::StoreError;

/// Errors surfaced by the orchestrator.
///
/// Network failures inside the generation flow are caught where they happen
/// and turned into a song's error phase; these variants reach callers only
/// from the explicit operations (open, select, checkout, retry).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A collaborator or the record service answered with an error.
    #[error(transparent)]
    Api(#[from] HttpApiError),

    /// The local mirror could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Generation failed for song {song_index}: {reason}")]
    GenerationFailed { song_index: SongIndex, reason: String },

    #[error(
        "Song {song_index} did not finish within {waited_secs}s. Refresh the page or contact support if it persists."
    )]
    WatchTimeout { song_index: SongIndex, waited_secs: u64 },

    #[error("Checkout blocked: {0}")]
    CheckoutBlocked(#[from] CheckoutBlocked),

    /// An operation needed an order but none has been opened yet.
    #[error("No order is loaded")]
    NotLoaded,

    #[error("Song {0} is not part of this order")]
    UnknownSong(SongIndex),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
