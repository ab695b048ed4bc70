use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ConnectionState, RoomId};

/// Notifications for the presentation layer.
///
/// Errors travel as display strings so the event stays cheap to clone and
/// serialize; the structured error is returned from the operation itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    ConnectionStateChanged { room: RoomId, state: ConnectionState },
    MessagesChanged { room: RoomId, len: usize },
    HistoryFailed { room: RoomId, error: String },
    SendFailed { room: RoomId, error: String },
    AuthRejected { room: RoomId, reason: String },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ClientEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
