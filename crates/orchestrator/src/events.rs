//! Orchestrator events, fanned out over a [`tokio::sync::broadcast`]
//! channel for whatever UI is driving the workflow.

use huggnote_core::phase::SongPhase;
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::{TaskSlot, VariationId};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A song moved to a new phase.
    PhaseChanged {
        order_id: OrderId,
        song_index: SongIndex,
        phase: SongPhase,
    },
    /// A variation request settled and its outcome was persisted.
    VariationUpdated {
        order_id: OrderId,
        song_index: SongIndex,
        variation_id: VariationId,
        task: TaskSlot,
    },
    /// A completion poll saw a new count of variations with audio.
    WatchProgress {
        order_id: OrderId,
        song_index: SongIndex,
        received: usize,
        expected: usize,
    },
    /// A remote save failed and the change is held locally only.
    SyncDegraded { order_id: OrderId, reason: String },
}

/// Fan-out bus. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to every current subscriber. Dropped if nobody listens.
    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(OrchestratorEvent::SyncDegraded {
            order_id: OrderId::from("o-1"),
            reason: "offline".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            OrchestratorEvent::SyncDegraded {
                order_id: OrderId::from("o-1"),
                reason: "offline".into(),
            }
        );
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        EventBus::default().publish(OrchestratorEvent::SyncDegraded {
            order_id: OrderId::from("o-2"),
            reason: "offline".into(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(OrchestratorEvent::PhaseChanged {
            order_id: OrderId::from("o-3"),
            song_index: 1,
            phase: SongPhase::Waiting,
        })
        .unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["phase"]["phase"], "waiting");
    }
}
