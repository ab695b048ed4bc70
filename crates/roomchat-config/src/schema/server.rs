//! Server endpoint configuration.

use serde::{Deserialize, Serialize};

/// Where the history/submit API and the live channel live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL for `GET {base}/{room}/messages` and `POST {base}/submit`.
    pub api_base_url: String,
    /// WebSocket endpoint of the live channel.
    pub ws_url: String,
    /// Whole-request timeout for REST calls (valid range: 1-120).
    pub request_timeout_secs: u32,
    /// TCP/TLS connect timeout for REST calls (valid range: 1-60).
    pub connect_timeout_secs: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api/v1/rooms".into(),
            ws_url: "ws://localhost:8080/api/v1/ws".into(),
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
        }
    }
}
