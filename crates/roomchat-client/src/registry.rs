//! Room → live channel registry shared by the connection manager and the
//! sender. Only the manager registers and unregisters; the sender reads.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use roomchat_common::{ChatError, RoomId};

use crate::protocol::ClientFrame;
use crate::transport::Outbound;

/// Write half of an authenticated live channel.
#[derive(Debug, Clone)]
pub struct LiveChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl LiveChannel {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { outbound }
    }

    /// False once the writer side of the transport has gone away.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a frame for the socket. Success means handed to the
    /// transport, not acknowledged by the server.
    pub fn transmit(&self, frame: &ClientFrame) -> Result<(), ChatError> {
        let text = frame.to_json()?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| ChatError::Network("live channel is closed".into()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<HashMap<RoomId, LiveChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, room: RoomId, channel: LiveChannel) {
        self.channels.write().await.insert(room, channel);
    }

    /// Idempotent.
    pub async fn unregister(&self, room: &RoomId) -> bool {
        self.channels.write().await.remove(room).is_some()
    }

    pub async fn get(&self, room: &RoomId) -> Option<LiveChannel> {
        self.channels.read().await.get(room).cloned()
    }

    pub async fn contains(&self, room: &RoomId) -> bool {
        self.channels.read().await.contains_key(room)
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SubmitPayload;

    fn submit() -> ClientFrame {
        ClientFrame::Submit(SubmitPayload {
            room_id: RoomId::from("r1"),
            user_id: "u1".into(),
            user_name: "alice".into(),
            text: "hi".into(),
        })
    }

    #[tokio::test]
    async fn register_get_unregister() {
        let registry = ChannelRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let room = RoomId::from("r1");

        registry.register(room.clone(), LiveChannel::new(tx)).await;
        assert!(registry.contains(&room).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.unregister(&room).await);
        assert!(!registry.unregister(&room).await);
        assert!(registry.get(&room).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn transmit_serializes_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = LiveChannel::new(tx);

        channel.transmit(&submit()).unwrap();
        match rx.recv().await.unwrap() {
            Outbound::Text(text) => assert!(text.contains("\"type\":\"submit\"")),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_receiver_closes_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = LiveChannel::new(tx);
        assert!(channel.is_open());

        drop(rx);
        assert!(!channel.is_open());
        assert!(matches!(
            channel.transmit(&submit()),
            Err(ChatError::Network(_))
        ));
    }
}
