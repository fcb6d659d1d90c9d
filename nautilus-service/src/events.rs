//! Multicast of swap status transitions.

use crate::status::SwapStatus;
use crate::swap::SwapKind;
use tokio::sync::broadcast;

/// A status transition published to subscribers.
#[derive(Debug, Clone)]
pub struct SwapStatusUpdate {
    pub id: String,
    pub kind: SwapKind,
    pub status: SwapStatus,
}

/// Fans swap status transitions out to any number of subscribers.
///
/// Slow subscribers may miss updates; the repository remains the source of
/// truth for the current status.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SwapStatusUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapStatusUpdate> {
        self.sender.subscribe()
    }

    pub fn publish(&self, id: &str, kind: SwapKind, status: SwapStatus) {
        tracing::debug!(swap_id = id, %kind, %status, "Publishing swap update");

        // Nobody listening is fine.
        let _ = self.sender.send(SwapStatusUpdate {
            id: id.to_string(),
            kind,
            status,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
