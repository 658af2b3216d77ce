//! Client-side orchestration of song variation generation.
//!
//! For each song of an order the [`controller::Orchestrator`] requests three
//! variations from the generation service, persists the returned task ids
//! through the [`mirror::PersistenceMirror`], and watches the server-side
//! record until the webhook-fed audio arrives. Selections then resolve back
//! to task ids for the payment handoff.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod mirror;
pub mod record_client;
pub mod requestor;
pub mod services;
pub mod store;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;
