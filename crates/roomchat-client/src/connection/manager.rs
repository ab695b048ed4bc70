//! Connection manager actor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use roomchat_common::{
    new_correlation_id, ChatError, ClientEvent, ConnectionState, Credential, EventBus, RoomId,
};

use super::machine::{Effect, RoomLink};
use super::{live_url, ConnectionSettings};
use crate::auth::Authenticator;
use crate::backoff::BackoffPolicy;
use crate::protocol::{ClientFrame, ServerFrame, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::registry::LiveChannel;
use crate::sender::MessageSender;
use crate::store::MessageStore;
use crate::transport::{Connector, Inbound, LiveLink, Outbound};

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to the connection manager task. Clones talk to the same task.
#[derive(Clone)]
pub struct ConnectionManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    states: Arc<RwLock<HashMap<RoomId, ConnectionState>>>,
    failures: Arc<RwLock<HashMap<RoomId, ChatError>>>,
}

impl ConnectionManager {
    /// Start the manager task. Must be called within a Tokio runtime.
    pub fn spawn(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn Authenticator>,
        sender: MessageSender,
        store: MessageStore,
        events: EventBus,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let states = Arc::new(RwLock::new(HashMap::new()));
        let failures = Arc::new(RwLock::new(HashMap::new()));

        let actor = ManagerActor {
            settings,
            connector,
            auth,
            sender,
            store,
            events,
            states: Arc::clone(&states),
            failures: Arc::clone(&failures),
            rooms: HashMap::new(),
            generations: HashMap::new(),
            link_tx,
        };
        tokio::spawn(actor.run(command_rx, link_rx));

        Self {
            command_tx,
            states,
            failures,
        }
    }

    /// Open the live channel for `room` unless one is already underway.
    pub async fn connect(&self, room: &RoomId) -> Result<(), ChatError> {
        let (done, ack) = oneshot::channel();
        self.request(ManagerCommand::Connect {
            room: room.clone(),
            done,
        })
        .await?;
        ack.await.map_err(|_| ChatError::Closed)
    }

    /// Cancel reconnects, close cleanly and unregister. Idempotent.
    pub async fn disconnect(&self, room: &RoomId) -> Result<(), ChatError> {
        let (done, ack) = oneshot::channel();
        self.request(ManagerCommand::Disconnect {
            room: room.clone(),
            done,
        })
        .await?;
        ack.await.map_err(|_| ChatError::Closed)
    }

    pub async fn state(&self, room: &RoomId) -> ConnectionState {
        self.states
            .read()
            .await
            .get(room)
            .copied()
            .unwrap_or_default()
    }

    /// Why `room` ended up `Failed`: `ChatError::Auth` after a rejected
    /// handshake, `ChatError::Network` once reconnect attempts ran out.
    /// Cleared by the next `connect` or `disconnect`.
    pub async fn failure(&self, room: &RoomId) -> Option<ChatError> {
        self.failures.read().await.get(room).cloned()
    }

    /// Disconnect every room and stop the task.
    pub async fn shutdown(&self) {
        let (done, ack) = oneshot::channel();
        if self
            .request(ManagerCommand::Shutdown { done })
            .await
            .is_ok()
        {
            let _ = ack.await;
        }
    }

    async fn request(&self, command: ManagerCommand) -> Result<(), ChatError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ChatError::Closed)
    }
}

enum ManagerCommand {
    Connect {
        room: RoomId,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        room: RoomId,
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Transport and timer events, tagged with the generation they belong to.
enum LinkEvent {
    Opened {
        room: RoomId,
        generation: u64,
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    Frame {
        room: RoomId,
        generation: u64,
        text: String,
    },
    Closed {
        room: RoomId,
        generation: u64,
        code: u16,
    },
    ReconnectDue {
        room: RoomId,
        generation: u64,
    },
    AuthDeadline {
        room: RoomId,
        generation: u64,
    },
}

impl LinkEvent {
    fn room(&self) -> &RoomId {
        match self {
            LinkEvent::Opened { room, .. }
            | LinkEvent::Frame { room, .. }
            | LinkEvent::Closed { room, .. }
            | LinkEvent::ReconnectDue { room, .. }
            | LinkEvent::AuthDeadline { room, .. } => room,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct RoomSlot {
    machine: RoomLink,
    link: Option<mpsc::UnboundedSender<Outbound>>,
    /// Credential the current attempt was opened with.
    credential: Option<Credential>,
    link_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    auth_timer: Option<JoinHandle<()>>,
}

impl RoomSlot {
    fn new(policy: BackoffPolicy, generation: u64) -> Self {
        Self {
            machine: RoomLink::resume(policy, generation),
            link: None,
            credential: None,
            link_task: None,
            reconnect_timer: None,
            auth_timer: None,
        }
    }

    fn stop_auth_timer(&mut self) {
        if let Some(timer) = self.auth_timer.take() {
            timer.abort();
        }
    }
}

struct ManagerActor {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn Authenticator>,
    sender: MessageSender,
    store: MessageStore,
    events: EventBus,
    states: Arc<RwLock<HashMap<RoomId, ConnectionState>>>,
    failures: Arc<RwLock<HashMap<RoomId, ChatError>>>,
    rooms: HashMap<RoomId, RoomSlot>,
    /// Last generation used by rooms that have been disconnected.
    generations: HashMap<RoomId, u64>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
}

impl ManagerActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ManagerCommand::Shutdown { done }) => {
                        self.disconnect_all().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.disconnect_all().await;
                        break;
                    }
                },
                Some(event) = link_rx.recv() => self.handle_link_event(event).await,
            }
        }
        debug!("connection manager stopped");
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Connect { room, done } => {
                let policy = self.settings.backoff;
                let generation = self.generations.get(&room).copied().unwrap_or(0);
                let slot = self
                    .rooms
                    .entry(room.clone())
                    .or_insert_with(|| RoomSlot::new(policy, generation));
                let effects = slot.machine.connect();
                if effects.is_empty() {
                    debug!(room = %room, state = %slot.machine.state(), "connect ignored");
                } else {
                    self.failures.write().await.remove(&room);
                }
                self.apply(&room, effects).await;
                self.sync_state(&room).await;
                let _ = done.send(());
            }
            ManagerCommand::Disconnect { room, done } => {
                self.disconnect_room(&room).await;
                let _ = done.send(());
            }
            ManagerCommand::Shutdown { done } => {
                self.disconnect_all().await;
                let _ = done.send(());
            }
        }
    }

    async fn disconnect_room(&mut self, room: &RoomId) {
        let Some(slot) = self.rooms.get_mut(room) else {
            self.sender.unregister_connection(room).await;
            return;
        };
        let effects = slot.machine.disconnect();
        self.apply(room, effects).await;
        self.sync_state(room).await;

        if let Some(slot) = self.rooms.remove(room) {
            self.generations
                .insert(room.clone(), slot.machine.generation());
        }
        self.states.write().await.remove(room);
        self.failures.write().await.remove(room);
        info!(room = %room, "room disconnected");
    }

    async fn disconnect_all(&mut self) {
        let rooms: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for room in rooms {
            self.disconnect_room(&room).await;
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        let room = event.room().clone();
        let Some(slot) = self.rooms.get_mut(&room) else {
            if let LinkEvent::Opened { outbound, .. } = event {
                let _ = outbound.send(Outbound::Close {
                    code: NORMAL_CLOSURE,
                });
            }
            return;
        };

        let effects = match event {
            LinkEvent::Opened {
                generation,
                outbound,
                ..
            } => {
                if !slot.machine.is_current(generation) {
                    debug!(room = %room, generation, "closing stale live channel");
                    let _ = outbound.send(Outbound::Close {
                        code: NORMAL_CLOSURE,
                    });
                    return;
                }
                info!(room = %room, generation, "live channel open");
                slot.link = Some(outbound);
                let has_credential = slot.credential.is_some();
                slot.machine.on_opened(generation, has_credential)
            }
            LinkEvent::Frame {
                generation, text, ..
            } => {
                if !slot.machine.is_current(generation) {
                    return;
                }
                match ServerFrame::parse(&text) {
                    Ok(frame) => slot.machine.on_frame(generation, frame),
                    Err(e) => {
                        warn!(room = %room, error = %e, "dropping malformed frame");
                        return;
                    }
                }
            }
            LinkEvent::Closed {
                generation, code, ..
            } => {
                if !slot.machine.is_current(generation) {
                    return;
                }
                info!(room = %room, code, "live channel closed");
                slot.link = None;
                slot.link_task = None;
                slot.machine.on_closed(generation, code)
            }
            LinkEvent::ReconnectDue { generation, .. } => {
                if !slot.machine.is_current(generation) {
                    return;
                }
                slot.reconnect_timer = None;
                slot.machine.on_reconnect_due(generation)
            }
            LinkEvent::AuthDeadline { generation, .. } => {
                if !slot.machine.is_current(generation) {
                    return;
                }
                slot.auth_timer = None;
                let effects = slot.machine.on_auth_deadline(generation);
                if !effects.is_empty() {
                    warn!(
                        room = %room,
                        timeout_secs = self.settings.handshake_timeout.as_secs(),
                        "no auth reply from server"
                    );
                }
                effects
            }
        };

        self.apply(&room, effects).await;
        self.sync_state(&room).await;
    }

    async fn apply(&mut self, room: &RoomId, effects: Vec<Effect>) {
        for effect in effects {
            let Some(slot) = self.rooms.get_mut(room) else {
                return;
            };
            match effect {
                Effect::Open { generation } => {
                    let credential = self.auth.current_credential();
                    let attempt_id = new_correlation_id();
                    info!(
                        room = %room,
                        attempt_id = %attempt_id,
                        generation,
                        attempt = slot.machine.attempt(),
                        url = %self.settings.ws_url,
                        authenticated = credential.is_some(),
                        "opening live channel"
                    );
                    match live_url(&self.settings.ws_url, room, credential.as_ref()) {
                        Ok(url) => {
                            slot.link_task = Some(tokio::spawn(run_link(
                                Arc::clone(&self.connector),
                                url,
                                self.settings.handshake_timeout,
                                room.clone(),
                                generation,
                                self.link_tx.clone(),
                            )));
                        }
                        Err(e) => {
                            warn!(room = %room, error = %e, "cannot build live channel url");
                            let _ = self.link_tx.send(LinkEvent::Closed {
                                room: room.clone(),
                                generation,
                                code: ABNORMAL_CLOSURE,
                            });
                        }
                    }
                    slot.credential = credential;
                }
                Effect::SendAuth => {
                    if let (Some(link), Some(credential)) = (&slot.link, &slot.credential) {
                        let frame = ClientFrame::Auth {
                            token: credential.token().to_string(),
                        };
                        match frame.to_json() {
                            Ok(json) => {
                                let _ = link.send(Outbound::Text(json));
                                debug!(room = %room, "auth frame sent");
                            }
                            Err(e) => warn!(room = %room, error = %e, "failed to encode auth frame"),
                        }
                    }
                }
                Effect::ArmAuthDeadline { generation } => {
                    slot.stop_auth_timer();
                    let link_tx = self.link_tx.clone();
                    let room = room.clone();
                    let deadline = self.settings.handshake_timeout;
                    slot.auth_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(deadline).await;
                        let _ = link_tx.send(LinkEvent::AuthDeadline { room, generation });
                    }));
                }
                Effect::Close { code } => {
                    slot.stop_auth_timer();
                    if let Some(link) = slot.link.take() {
                        let _ = link.send(Outbound::Close { code });
                    }
                    if let Some(task) = slot.link_task.take() {
                        task.abort();
                    }
                }
                Effect::Register => {
                    slot.stop_auth_timer();
                    if let Some(link) = &slot.link {
                        self.sender
                            .register_connection(room.clone(), LiveChannel::new(link.clone()))
                            .await;
                    }
                }
                Effect::Unregister => {
                    self.sender.unregister_connection(room).await;
                }
                Effect::ScheduleReconnect { generation, delay } => {
                    if let Some(timer) = slot.reconnect_timer.take() {
                        timer.abort();
                    }
                    info!(
                        room = %room,
                        delay_ms = delay.as_millis() as u64,
                        attempt = slot.machine.attempt(),
                        "scheduling reconnect"
                    );
                    let link_tx = self.link_tx.clone();
                    let room = room.clone();
                    slot.reconnect_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = link_tx.send(LinkEvent::ReconnectDue { room, generation });
                    }));
                }
                Effect::CancelReconnect => {
                    if let Some(timer) = slot.reconnect_timer.take() {
                        timer.abort();
                    }
                }
                Effect::Deliver(message) => {
                    self.store.insert_live(message).await;
                }
                Effect::ReportAuthRejected { reason } => {
                    warn!(room = %room, reason = %reason, "live channel authentication rejected");
                    self.failures
                        .write()
                        .await
                        .insert(room.clone(), ChatError::Auth(reason.clone()));
                    self.events.publish(ClientEvent::AuthRejected {
                        room: room.clone(),
                        reason,
                    });
                }
            }
        }
    }

    /// Publish the machine state if it changed.
    async fn sync_state(&mut self, room: &RoomId) {
        let Some(slot) = self.rooms.get(room) else {
            return;
        };
        let state = slot.machine.state();
        let previous = self
            .states
            .write()
            .await
            .insert(room.clone(), state)
            .unwrap_or_default();

        if state == ConnectionState::Failed {
            let attempts = self.settings.backoff.max_attempts();
            self.failures
                .write()
                .await
                .entry(room.clone())
                .or_insert_with(|| {
                    ChatError::Network(format!("gave up after {attempts} reconnect attempts"))
                });
        }

        if previous != state {
            info!(room = %room, from = %previous, to = %state, "connection state changed");
            self.events.publish(ClientEvent::ConnectionStateChanged {
                room: room.clone(),
                state,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Link task
// ---------------------------------------------------------------------------

/// Open one transport connection and forward its events until it closes.
async fn run_link(
    connector: Arc<dyn Connector>,
    url: String,
    handshake_timeout: Duration,
    room: RoomId,
    generation: u64,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
) {
    let link = match tokio::time::timeout(handshake_timeout, connector.connect(&url)).await {
        Ok(Ok(link)) => link,
        Ok(Err(e)) => {
            warn!(room = %room, error = %e, "live channel connect failed");
            let _ = link_tx.send(LinkEvent::Closed {
                room,
                generation,
                code: ABNORMAL_CLOSURE,
            });
            return;
        }
        Err(_elapsed) => {
            warn!(
                room = %room,
                timeout_secs = handshake_timeout.as_secs(),
                "live channel handshake timed out"
            );
            let _ = link_tx.send(LinkEvent::Closed {
                room,
                generation,
                code: ABNORMAL_CLOSURE,
            });
            return;
        }
    };

    let LiveLink {
        outbound,
        mut inbound,
    } = link;
    let opened = LinkEvent::Opened {
        room: room.clone(),
        generation,
        outbound,
    };
    if link_tx.send(opened).is_err() {
        return;
    }

    let code = loop {
        match inbound.recv().await {
            Some(Inbound::Text(text)) => {
                let frame = LinkEvent::Frame {
                    room: room.clone(),
                    generation,
                    text,
                };
                if link_tx.send(frame).is_err() {
                    return;
                }
            }
            Some(Inbound::Closed { code }) => break code,
            None => break ABNORMAL_CLOSURE,
        }
    };
    let _ = link_tx.send(LinkEvent::Closed {
        room,
        generation,
        code,
    });
}
