//! Ordered, de-duplicated message view of the active room.
//!
//! Every load captures the store generation when it is dispatched and
//! drops its result if the generation has moved on by the time the
//! response arrives. `initial_load` and `clear` bump the generation.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use roomchat_common::{ChatError, ClientEvent, EventBus, Message, RoomId};

use crate::rest::HistorySource;

/// Result of a history load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was merged; `added` counts messages not already present.
    Applied { added: usize },
    /// Nothing to do: no more history, a load already in flight, or no room.
    Skipped,
    /// The store moved on while the request was in flight; result dropped.
    Stale,
}

#[derive(Default)]
struct StoreState {
    room: Option<RoomId>,
    messages: Vec<Message>,
    ids: HashSet<String>,
    cursor: Option<String>,
    has_more: bool,
    page_size: u32,
    generation: u64,
    loading_older: bool,
    fetch_error: Option<ChatError>,
}

impl StoreState {
    fn reset(&mut self) {
        self.generation += 1;
        self.room = None;
        self.messages.clear();
        self.ids.clear();
        self.cursor = None;
        self.has_more = false;
        self.loading_older = false;
        self.fetch_error = None;
    }

    /// Merge messages, skipping known ids, and restore `createdAt` order.
    fn merge(&mut self, items: Vec<Message>) -> usize {
        let before = self.messages.len();
        for message in items {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.sort_by_key(|m| m.created_at);
        self.messages.len() - before
    }

    /// Put an older page in front of the loaded window.
    fn prepend(&mut self, mut page: Vec<Message>) -> usize {
        page.sort_by_key(|m| m.created_at);
        let mut fresh: Vec<Message> = page
            .into_iter()
            .filter(|m| self.ids.insert(m.id.clone()))
            .collect();
        let added = fresh.len();
        fresh.append(&mut self.messages);
        self.messages = fresh;
        // A stray page entry newer than the window must not break ordering.
        self.messages.sort_by_key(|m| m.created_at);
        added
    }

    fn apply_cursor(&mut self, cursor: Option<String>) {
        self.has_more = cursor.is_some();
        self.cursor = cursor;
    }
}

/// Shared handle to the message store. Clones see the same state.
#[derive(Clone)]
pub struct MessageStore {
    state: Arc<Mutex<StoreState>>,
    history: Arc<dyn HistorySource>,
    events: EventBus,
}

impl MessageStore {
    pub fn new(history: Arc<dyn HistorySource>, events: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            history,
            events,
        }
    }

    /// Reset the store for `room` and load its newest `limit` messages.
    ///
    /// Live messages inserted while the request is in flight are kept and
    /// merged with the page.
    pub async fn initial_load(&self, room: &RoomId, limit: u32) -> Result<LoadOutcome, ChatError> {
        let generation = {
            let mut state = self.state.lock().await;
            state.reset();
            state.room = Some(room.clone());
            state.page_size = limit;
            state.generation
        };
        self.publish_changed(room, 0);
        debug!(room = %room, limit, generation, "initial history load");

        let result = self.history.fetch_page(room, limit, None).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(room = %room, generation, "discarding stale initial load");
            return Ok(LoadOutcome::Stale);
        }

        match result {
            Ok(page) => {
                let added = state.merge(page.items);
                state.apply_cursor(page.next_cursor);
                state.fetch_error = None;
                let len = state.messages.len();
                drop(state);
                self.publish_changed(room, len);
                Ok(LoadOutcome::Applied { added })
            }
            Err(e) => {
                warn!(room = %room, error = %e, "initial history load failed");
                state.fetch_error = Some(e.clone());
                drop(state);
                self.events.publish(ClientEvent::HistoryFailed {
                    room: room.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Fetch the page before the oldest loaded message and prepend it.
    pub async fn load_older(&self) -> Result<LoadOutcome, ChatError> {
        let (room, cursor, limit, generation) = {
            let mut state = self.state.lock().await;
            if !state.has_more || state.loading_older {
                return Ok(LoadOutcome::Skipped);
            }
            let (Some(room), Some(cursor)) = (state.room.clone(), state.cursor.clone()) else {
                return Ok(LoadOutcome::Skipped);
            };
            state.loading_older = true;
            (room, cursor, state.page_size, state.generation)
        };
        debug!(room = %room, cursor = %cursor, "loading older history");

        let result = self.history.fetch_page(&room, limit, Some(&cursor)).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(room = %room, generation, "discarding stale older page");
            return Ok(LoadOutcome::Stale);
        }
        state.loading_older = false;

        match result {
            Ok(page) => {
                let added = state.prepend(page.items);
                state.apply_cursor(page.next_cursor);
                state.fetch_error = None;
                let len = state.messages.len();
                drop(state);
                self.publish_changed(&room, len);
                Ok(LoadOutcome::Applied { added })
            }
            Err(e) => {
                warn!(room = %room, error = %e, "older history load failed");
                state.fetch_error = Some(e.clone());
                drop(state);
                self.events.publish(ClientEvent::HistoryFailed {
                    room,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Insert a message from the live channel. Returns whether it was new.
    pub async fn insert_live(&self, message: Message) -> bool {
        let mut state = self.state.lock().await;
        if state.room.as_ref() != Some(&message.room_id) {
            debug!(room = %message.room_id, id = %message.id, "live message for inactive room");
            return false;
        }
        if !state.ids.insert(message.id.clone()) {
            return false;
        }

        let room = message.room_id.clone();
        let at = state
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        state.messages.insert(at, message);
        let len = state.messages.len();
        drop(state);

        self.publish_changed(&room, len);
        true
    }

    /// Forget the current room and invalidate every in-flight load.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let previous = state.room.clone();
        state.reset();
        drop(state);

        if let Some(room) = previous {
            self.publish_changed(&room, 0);
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.messages.is_empty()
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn is_loading_older(&self) -> bool {
        self.state.lock().await.loading_older
    }

    pub async fn active_room(&self) -> Option<RoomId> {
        self.state.lock().await.room.clone()
    }

    /// Last history failure, held until the next successful load or `clear`.
    pub async fn fetch_error(&self) -> Option<ChatError> {
        self.state.lock().await.fetch_error.clone()
    }

    fn publish_changed(&self, room: &RoomId, len: usize) {
        self.events.publish(ClientEvent::MessagesChanged {
            room: room.clone(),
            len,
        });
    }
}
