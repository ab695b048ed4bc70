//! One user's chat session: the glue a front end drives.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::info;

use roomchat_common::{ChatError, ClientEvent, ConnectionState, EventBus, RoomId};
use roomchat_config::schema::IdentityConfig;
use roomchat_config::RoomchatConfig;

use crate::auth::Authenticator;
use crate::connection::{ConnectionManager, ConnectionSettings};
use crate::registry::ChannelRegistry;
use crate::rest::{HistorySource, RestClient, SubmitChannel};
use crate::sender::{Delivery, MessageSender};
use crate::store::{LoadOutcome, MessageStore};
use crate::transport::{Connector, WsConnector};

/// Who outgoing messages are sent as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

impl From<&IdentityConfig> for Identity {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            user_name: config.user_name.clone(),
        }
    }
}

/// Collaborators for [`ChatSession::with_parts`].
pub struct SessionParts {
    pub settings: ConnectionSettings,
    pub connector: Arc<dyn Connector>,
    pub auth: Arc<dyn Authenticator>,
    pub history: Arc<dyn HistorySource>,
    pub submit: Arc<dyn SubmitChannel>,
    pub identity: Identity,
    pub page_size: u32,
}

pub struct ChatSession {
    identity: Identity,
    page_size: u32,
    events: EventBus,
    store: MessageStore,
    sender: MessageSender,
    manager: ConnectionManager,
    current_room: Mutex<Option<RoomId>>,
}

impl ChatSession {
    /// Build a session talking to the configured server over HTTP and
    /// WebSocket. Must be called within a Tokio runtime.
    pub fn from_config(
        config: &RoomchatConfig,
        auth: Arc<dyn Authenticator>,
    ) -> Result<Self, ChatError> {
        roomchat_config::validation::validate(config)?;
        let rest = Arc::new(RestClient::new(&config.server, Arc::clone(&auth))?);

        Ok(Self::with_parts(SessionParts {
            settings: ConnectionSettings::from_config(config),
            connector: Arc::new(WsConnector),
            auth,
            history: rest.clone(),
            submit: rest,
            identity: Identity::from(&config.identity),
            page_size: config.history.page_size,
        }))
    }

    pub fn with_parts(parts: SessionParts) -> Self {
        let events = EventBus::default();
        let store = MessageStore::new(parts.history, events.clone());
        let sender = MessageSender::new(ChannelRegistry::new(), parts.submit, events.clone());
        let manager = ConnectionManager::spawn(
            parts.settings,
            parts.connector,
            parts.auth,
            sender.clone(),
            store.clone(),
            events.clone(),
        );

        Self {
            identity: parts.identity,
            page_size: parts.page_size,
            events,
            store,
            sender,
            manager,
            current_room: Mutex::new(None),
        }
    }

    /// Connect to `room` and load its newest page, leaving any other room.
    ///
    /// A history failure is returned (and kept as the store's fetch error)
    /// but leaves the live channel running.
    pub async fn enter_room(&self, room: &RoomId) -> Result<LoadOutcome, ChatError> {
        let previous = self.current_room.lock().await.clone();
        if let Some(previous) = previous.filter(|p| p != room) {
            self.leave_room().await?;
            info!(from = %previous, to = %room, "switching rooms");
        }

        *self.current_room.lock().await = Some(room.clone());
        self.manager.connect(room).await?;
        self.store.initial_load(room, self.page_size).await
    }

    /// Disconnect, drop loaded messages and clear the send error.
    pub async fn leave_room(&self) -> Result<(), ChatError> {
        let Some(room) = self.current_room.lock().await.take() else {
            return Ok(());
        };
        self.manager.disconnect(&room).await?;
        self.store.clear().await;
        self.sender.clear_send_error().await;
        info!(room = %room, "left room");
        Ok(())
    }

    pub async fn send(&self, text: &str) -> Result<Delivery, ChatError> {
        let room = self.require_room().await?;
        self.sender
            .send(&room, text, &self.identity.user_id, &self.identity.user_name)
            .await
    }

    pub async fn load_older(&self) -> Result<LoadOutcome, ChatError> {
        self.store.load_older().await
    }

    /// Manual reconnect, e.g. after an auth rejection or exhausted retries.
    pub async fn reconnect(&self) -> Result<(), ChatError> {
        let room = self.require_room().await?;
        self.manager.connect(&room).await
    }

    /// Reload the newest page, e.g. from a history error banner.
    pub async fn reload(&self) -> Result<LoadOutcome, ChatError> {
        let room = self.require_room().await?;
        self.store.initial_load(&room, self.page_size).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn current_room(&self) -> Option<RoomId> {
        self.current_room.lock().await.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        match self.current_room().await {
            Some(room) => self.manager.state(&room).await,
            None => ConnectionState::Disconnected,
        }
    }

    /// Why the current room's live channel is `Failed`, if it is.
    pub async fn connection_error(&self) -> Option<ChatError> {
        let room = self.current_room().await?;
        self.manager.failure(&room).await
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Leave the current room and stop the connection manager.
    pub async fn shutdown(&self) {
        let _ = self.leave_room().await;
        self.manager.shutdown().await;
    }

    async fn require_room(&self) -> Result<RoomId, ChatError> {
        self.current_room
            .lock()
            .await
            .clone()
            .ok_or_else(|| ChatError::Send("not in a room".into()))
    }
}
