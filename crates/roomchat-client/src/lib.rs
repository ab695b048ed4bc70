//! Real-time room chat client.
//!
//! - [`connection`]: one live channel per room, auth handshake, backoff
//!   reconnects.
//! - [`store`]: ordered, de-duplicated, paginated messages of the active room.
//! - [`sender`]: live channel first, HTTP fallback second.
//! - [`session`]: wires the above together from a [`roomchat_config::RoomchatConfig`].

pub mod auth;
pub mod backoff;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod rest;
pub mod sender;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{Authenticator, EnvAuthenticator, StaticAuthenticator};
pub use backoff::BackoffPolicy;
pub use connection::{ConnectionManager, ConnectionSettings};
pub use protocol::{ClientFrame, HistoryPage, ServerFrame, SubmitPayload};
pub use registry::{ChannelRegistry, LiveChannel};
pub use rest::{HistorySource, RestClient, SubmitChannel};
pub use sender::{Delivery, MessageSender};
pub use session::{ChatSession, Identity, SessionParts};
pub use store::{LoadOutcome, MessageStore};
pub use transport::{Connector, Inbound, LiveLink, Outbound, WsConnector};
