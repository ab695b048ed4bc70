//! Outgoing messages: live channel first, HTTP fallback second.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use roomchat_common::{ChatError, ClientEvent, EventBus, RoomId};

use crate::protocol::{ClientFrame, SubmitPayload};
use crate::registry::{ChannelRegistry, LiveChannel};
use crate::rest::SubmitChannel;

/// Which path carried a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the live channel. Not acknowledged by the server.
    Live,
    /// Accepted by the request/response fallback.
    Fallback,
}

#[derive(Clone)]
pub struct MessageSender {
    registry: ChannelRegistry,
    fallback: Arc<dyn SubmitChannel>,
    events: EventBus,
    send_error: Arc<Mutex<Option<ChatError>>>,
}

impl MessageSender {
    pub fn new(registry: ChannelRegistry, fallback: Arc<dyn SubmitChannel>, events: EventBus) -> Self {
        Self {
            registry,
            fallback,
            events,
            send_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub async fn register_connection(&self, room: RoomId, channel: LiveChannel) {
        self.registry.register(room, channel).await;
    }

    pub async fn unregister_connection(&self, room: &RoomId) {
        self.registry.unregister(room).await;
    }

    /// Send `text` to `room` as the given user.
    ///
    /// A failed fallback is also kept as the send error until
    /// [`MessageSender::clear_send_error`] or the next `send`.
    pub async fn send(
        &self,
        room: &RoomId,
        text: &str,
        sender_id: &str,
        sender_name: &str,
    ) -> Result<Delivery, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::Send("message text is empty".into()));
        }
        self.clear_send_error().await;

        let payload = SubmitPayload {
            room_id: room.clone(),
            user_id: sender_id.to_string(),
            user_name: sender_name.to_string(),
            text: text.to_string(),
        };

        if let Some(channel) = self.registry.get(room).await {
            if channel.is_open() {
                match channel.transmit(&ClientFrame::Submit(payload.clone())) {
                    Ok(()) => {
                        debug!(room = %room, "message sent over live channel");
                        return Ok(Delivery::Live);
                    }
                    Err(e) => {
                        warn!(room = %room, error = %e, "live send failed, falling back to http");
                    }
                }
            } else {
                debug!(room = %room, "registered live channel is closed, using http");
            }
        }

        match self.fallback.submit(&payload).await {
            Ok(()) => {
                debug!(room = %room, "message sent over http fallback");
                Ok(Delivery::Fallback)
            }
            Err(e) => {
                warn!(room = %room, error = %e, "message send failed");
                *self.send_error.lock().await = Some(e.clone());
                self.events.publish(ClientEvent::SendFailed {
                    room: room.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn send_error(&self) -> Option<ChatError> {
        self.send_error.lock().await.clone()
    }

    pub async fn clear_send_error(&self) {
        *self.send_error.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSubmit;
    use crate::transport::Outbound;
    use tokio::sync::mpsc;

    fn sender_with(submit: Arc<FakeSubmit>) -> (MessageSender, EventBus) {
        let events = EventBus::new(16);
        let sender = MessageSender::new(ChannelRegistry::new(), submit, events.clone());
        (sender, events)
    }

    #[tokio::test]
    async fn uses_open_live_channel() {
        let submit = FakeSubmit::new();
        let (sender, _) = sender_with(submit.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        sender
            .register_connection(RoomId::from("r1"), LiveChannel::new(tx))
            .await;

        let delivery = sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Live);
        assert!(submit.submitted().is_empty());
        let Some(Outbound::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "submit",
                "roomId": "r1",
                "userId": "u1",
                "userName": "alice",
                "text": "hello"
            })
        );
    }

    #[tokio::test]
    async fn falls_back_without_live_channel() {
        let submit = FakeSubmit::new();
        let (sender, _) = sender_with(submit.clone());

        let delivery = sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Fallback);
        assert_eq!(
            submit.submitted(),
            vec![SubmitPayload {
                room_id: RoomId::from("r1"),
                user_id: "u1".into(),
                user_name: "alice".into(),
                text: "hello".into(),
            }]
        );
    }

    #[tokio::test]
    async fn falls_back_when_live_channel_is_closed() {
        let submit = FakeSubmit::new();
        let (sender, _) = sender_with(submit.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        sender
            .register_connection(RoomId::from("r1"), LiveChannel::new(tx))
            .await;
        drop(rx);

        let delivery = sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Fallback);
        assert_eq!(submit.submitted().len(), 1);
    }

    #[tokio::test]
    async fn live_channel_of_other_room_is_not_used() {
        let submit = FakeSubmit::new();
        let (sender, _) = sender_with(submit.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        sender
            .register_connection(RoomId::from("r2"), LiveChannel::new(tx))
            .await;

        let delivery = sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Fallback);
    }

    #[tokio::test]
    async fn fallback_failure_sets_sticky_send_error() {
        let submit = FakeSubmit::new();
        submit.fail_with(Some(ChatError::Send("room is read-only".into())));
        let (sender, events) = sender_with(submit.clone());
        let mut rx = events.subscribe();

        let err = sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Send(_)));
        assert!(sender.send_error().await.is_some());
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::SendFailed {
                room: RoomId::from("r1"),
                error: "send failed: room is read-only".into(),
            }
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(sender.send_error().await.is_some());

        sender.clear_send_error().await;
        assert!(sender.send_error().await.is_none());
    }

    #[tokio::test]
    async fn retry_clears_previous_error() {
        let submit = FakeSubmit::new();
        submit.fail_with(Some(ChatError::Send("timeout".into())));
        let (sender, _) = sender_with(submit.clone());

        assert!(sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .is_err());

        submit.fail_with(None);
        sender
            .send(&RoomId::from("r1"), "hello", "u1", "alice")
            .await
            .unwrap();
        assert!(sender.send_error().await.is_none());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_locally() {
        let submit = FakeSubmit::new();
        let (sender, _) = sender_with(submit.clone());

        let err = sender
            .send(&RoomId::from("r1"), "   \n", "u1", "alice")
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Send(_)));
        assert!(submit.submitted().is_empty());
        assert!(sender.send_error().await.is_none());
    }

    #[tokio::test]
    async fn unregister_forces_fallback() {
        let submit = FakeSubmit::new();
        let (sender, _) = sender_with(submit.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let room = RoomId::from("r1");
        sender.register_connection(room.clone(), LiveChannel::new(tx)).await;
        sender.unregister_connection(&room).await;

        let delivery = sender.send(&room, "hi", "u1", "alice").await.unwrap();
        assert_eq!(delivery, Delivery::Fallback);
    }
}
