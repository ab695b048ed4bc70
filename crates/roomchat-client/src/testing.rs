//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, Semaphore};

use roomchat_common::{ChatError, Message, RoomId};

use crate::protocol::{HistoryPage, SubmitPayload};
use crate::rest::{HistorySource, SubmitChannel};
use crate::transport::{Connector, Inbound, LiveLink, Outbound};

pub(crate) fn message(id: &str, room: &str, secs: i64) -> Message {
    Message {
        id: id.into(),
        room_id: RoomId::from(room),
        user_id: "u1".into(),
        user_name: "alice".into(),
        text: format!("text {id}"),
        kind: "message".into(),
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

pub(crate) fn page(items: Vec<Message>, cursor: Option<&str>) -> HistoryPage {
    HistoryPage {
        items,
        next_cursor: cursor.map(String::from),
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FetchCall {
    pub(crate) room: RoomId,
    pub(crate) limit: u32,
    pub(crate) cursor: Option<String>,
}

/// Replies with queued results in order; an empty queue yields an empty page.
pub(crate) struct FakeHistory {
    replies: Mutex<VecDeque<Result<HistoryPage, ChatError>>>,
    calls: Mutex<Vec<FetchCall>>,
    gate: Semaphore,
}

impl FakeHistory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
        })
    }

    /// Every fetch waits for [`FakeHistory::release`] before replying.
    pub(crate) fn gated() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
        })
    }

    pub(crate) fn reply(&self, result: Result<HistoryPage, ChatError>) {
        self.replies.lock().unwrap().push_back(result);
    }

    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) async fn wait_for_calls(&self, n: usize) {
        while self.calls.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl HistorySource for FakeHistory {
    async fn fetch_page(
        &self,
        room: &RoomId,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, ChatError> {
        self.calls.lock().unwrap().push(FetchCall {
            room: room.clone(),
            limit,
            cursor: cursor.map(String::from),
        });
        let reply = self.replies.lock().unwrap().pop_front();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        reply.unwrap_or_else(|| Ok(HistoryPage::default()))
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeSubmit {
    submitted: Mutex<Vec<SubmitPayload>>,
    failure: Mutex<Option<ChatError>>,
}

impl FakeSubmit {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_with(&self, error: Option<ChatError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub(crate) fn submitted(&self) -> Vec<SubmitPayload> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmitChannel for FakeSubmit {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), ChatError> {
        self.submitted.lock().unwrap().push(payload.clone());
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectMode {
    Accept,
    Refuse,
    Hang,
}

/// Server side of an in-memory link.
pub(crate) struct FakeServer {
    pub(crate) url: String,
    pub(crate) from_client: mpsc::UnboundedReceiver<Outbound>,
    pub(crate) to_client: mpsc::Sender<Inbound>,
}

impl FakeServer {
    pub(crate) async fn send_text(&self, text: &str) {
        self.to_client
            .send(Inbound::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub(crate) async fn close(&self, code: u16) {
        self.to_client.send(Inbound::Closed { code }).await.unwrap();
    }
}

pub(crate) struct FakeConnector {
    mode: Mutex<ConnectMode>,
    attempts: Mutex<Vec<String>>,
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl FakeConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            mode: Mutex::new(ConnectMode::Accept),
            attempts: Mutex::new(Vec::new()),
            servers,
        });
        (connector, rx)
    }

    pub(crate) fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<LiveLink, ChatError> {
        self.attempts.lock().unwrap().push(url.to_string());
        let mode = *self.mode.lock().unwrap();
        match mode {
            ConnectMode::Refuse => Err(ChatError::Network("connection refused".into())),
            ConnectMode::Hang => std::future::pending().await,
            ConnectMode::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound_rx) = mpsc::channel(64);
                let _ = self.servers.send(FakeServer {
                    url: url.to_string(),
                    from_client: outbound_rx,
                    to_client: inbound_tx,
                });
                Ok(LiveLink {
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                })
            }
        }
    }
}
