//! Live connection lifecycle, one connection per room.
//!
//! [`ConnectionManager`] is a cheap handle to a single actor task that owns
//! every room's state machine, so transport events, timers and user
//! commands are applied one at a time.

mod machine;
mod manager;

pub use manager::ConnectionManager;

use std::time::Duration;

use reqwest::Url;

use roomchat_common::{ChatError, Credential, RoomId};
use roomchat_config::RoomchatConfig;

use crate::backoff::BackoffPolicy;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Live channel endpoint without query parameters.
    pub ws_url: String,
    /// How long the transport may take to open.
    pub handshake_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl ConnectionSettings {
    pub fn from_config(config: &RoomchatConfig) -> Self {
        Self {
            ws_url: config.server.ws_url.clone(),
            handshake_timeout: Duration::from_secs(u64::from(
                config.connection.handshake_timeout_secs,
            )),
            backoff: BackoffPolicy::from_config(&config.connection),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&RoomchatConfig::default())
    }
}

/// `ws_url?roomId=<room>[&token=<credential>]`
pub(crate) fn live_url(
    ws_url: &str,
    room: &RoomId,
    credential: Option<&Credential>,
) -> Result<String, ChatError> {
    let mut url = Url::parse(ws_url)
        .map_err(|e| ChatError::Network(format!("invalid live channel url {ws_url}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("roomId", room.as_str());
        if let Some(credential) = credential {
            query.append_pair("token", credential.token());
        }
    }
    Ok(url.into())
}
