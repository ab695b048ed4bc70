//! Configuration schema types for roomchat.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod connection;
mod history;
mod identity;
mod server;
mod system;

pub use connection::*;
pub use history::*;
pub use identity::*;
pub use server::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
///
/// Every option has a default that talks to a locally running server.
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct RoomchatConfig {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub history: HistoryConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}
