//! Broadcast hub feeding the public lobby-feed SSE stream.

use tokio::sync::broadcast;

use crate::dto::sse::FeedEvent;

/// Simple broadcast hub the lobby feed subscribers attach to.
pub struct FeedHub {
    sender: broadcast::Sender<FeedEvent>,
}

impl FeedHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: FeedEvent) {
        let _ = self.sender.send(event);
    }
}
