//! Per-song generation phase machine.
//!
//! ```text
//! Idle --StartGeneration--> Generating --BatchIssued--> Waiting --Completed--> Ready
//!   ^                          |                          |
//!   |                          +---------Fail-------------+-------> Error
//!   +-----------------------Reset (from Error or Ready)-------------+
//! ```
//!
//! `Resume` jumps straight from `Idle` to `Waiting` when task ids are
//! already persisted for the song.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "message", rename_all = "snake_case")]
pub enum SongPhase {
    #[default]
    Idle,
    Generating,
    Waiting,
    Ready,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    StartGeneration,
    /// All three requests were issued, whatever their outcome.
    BatchIssued,
    /// Persisted task ids exist; skip straight to watching.
    Resume,
    Completed,
    Fail(String),
    Reset,
}

impl SongPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SongPhase::Idle => "idle",
            SongPhase::Generating => "generating",
            SongPhase::Waiting => "waiting",
            SongPhase::Ready => "ready",
            SongPhase::Error(_) => "error",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, SongPhase::Generating | SongPhase::Waiting)
    }

    /// Compute the next phase, rejecting transitions the machine does not
    /// allow.
    pub fn apply(&self, event: PhaseEvent) -> Result<SongPhase, CoreError> {
        use PhaseEvent as E;
        use SongPhase as P;

        let next = match (self, event) {
            (P::Idle, E::StartGeneration) => P::Generating,
            (P::Idle, E::Resume) => P::Waiting,
            (P::Generating, E::BatchIssued) => P::Waiting,
            (P::Waiting, E::Completed) => P::Ready,
            // A resumed song may already be complete on first load.
            (P::Idle, E::Completed) => P::Ready,
            (P::Idle | P::Generating | P::Waiting, E::Fail(msg)) => P::Error(msg),
            (P::Error(_) | P::Ready | P::Idle, E::Reset) => P::Idle,
            (current, event) => {
                return Err(CoreError::Conflict(format!(
                    "Cannot apply {event:?} while song is {}",
                    current.name()
                )))
            }
        };
        Ok(next)
    }
}
