//! Live connection lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Handshake and reconnect tuning for the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Seconds the transport gets to reach the open state (valid range: 1-120).
    pub handshake_timeout_secs: u32,
    /// Delay before the first reconnect attempt, doubled per attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for any single reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up and reporting `failed`.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 10,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
        }
    }
}
