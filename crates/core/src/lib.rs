//! Domain types and pure logic for Huggnote song orders.
//!
//! Everything in this crate is I/O free: order forms and their validation,
//! typed variation maps with monotonic merge rules, the prompt cache, the
//! per-song phase machine, selection gating and webhook signatures. The
//! record service and the orchestrator both build on these types.

pub mod error;
pub mod order;
pub mod phase;
pub mod prompt;
pub mod record;
pub mod selection;
pub mod types;
pub mod variation;
pub mod webhook;
