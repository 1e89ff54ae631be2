//! Best-effort fan-out of channel events to observers.
//!
//! Every event is serialized once into an [`EventFrame`] and pushed onto a
//! `tokio::sync::broadcast` channel. Slow observers lag and lose frames;
//! publishing never waits on them.

use std::sync::atomic::{AtomicU64, Ordering};

use {
    async_trait::async_trait,
    courier_channels::{ChannelEvent, ChannelEventSink},
    courier_common::types::now_ms,
    serde::Serialize,
    tokio::sync::broadcast,
    tracing::{debug, warn},
};

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Wire form of one broadcast event.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    pub seq: u64,
    pub ts: i64,
    pub event: ChannelEvent,
}

pub struct Broadcaster {
    tx: broadcast::Sender<String>,
    seq: AtomicU64,
}

impl Broadcaster {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Receive every frame published from now on, as JSON.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

#[async_trait]
impl ChannelEventSink for Broadcaster {
    async fn emit(&self, event: ChannelEvent) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = EventFrame {
            seq,
            ts: now_ms(),
            event,
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize channel event: {e}");
                return;
            },
        };
        if self.tx.send(json).is_err() {
            debug!(seq, "no observers for channel event");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, courier_common::types::AssignmentMode};

    fn assignment_event(id: &str) -> ChannelEvent {
        ChannelEvent::AssignmentChanged {
            conversation_id: id.into(),
            mode: AssignmentMode::Human,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_numbered_frames() {
        let broadcaster = Broadcaster::default();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.observer_count(), 1);

        broadcaster.emit(assignment_event("c1")).await;
        broadcaster.emit(assignment_event("c2")).await;

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["seq"], 1);
        assert_eq!(first["event"]["kind"], "assignment_changed");
        assert_eq!(first["event"]["mode"], "human");
        assert_eq!(second["seq"], 2);
        assert_eq!(second["event"]["conversation_id"], "c2");
    }

    #[tokio::test]
    async fn emitting_without_observers_is_fine() {
        let broadcaster = Broadcaster::default();
        broadcaster.emit(assignment_event("c1")).await;
        assert_eq!(broadcaster.observer_count(), 0);
    }

    #[tokio::test]
    async fn slow_observer_lags_instead_of_blocking() {
        let broadcaster = Broadcaster::new(2);
        let mut rx = broadcaster.subscribe();
        for i in 0..5 {
            broadcaster.emit(assignment_event(&format!("c{i}"))).await;
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        let next: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(next["seq"], 4);
    }
}
