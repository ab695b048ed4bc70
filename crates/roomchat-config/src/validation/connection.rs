//! Validation for handshake, backoff, and paging limits.

use crate::schema::RoomchatConfig;

use super::helpers::validate_range;

pub(crate) fn validate_connection(errors: &mut Vec<String>, config: &RoomchatConfig) {
    let conn = &config.connection;
    validate_range(
        errors,
        "connection.handshake_timeout_secs",
        u64::from(conn.handshake_timeout_secs),
        1,
        120,
    );
    validate_range(
        errors,
        "connection.reconnect_base_delay_ms",
        conn.reconnect_base_delay_ms,
        50,
        60_000,
    );
    validate_range(
        errors,
        "connection.reconnect_max_delay_ms",
        conn.reconnect_max_delay_ms,
        conn.reconnect_base_delay_ms,
        600_000,
    );
    validate_range(
        errors,
        "connection.max_reconnect_attempts",
        u64::from(conn.max_reconnect_attempts),
        0,
        50,
    );
}

pub(crate) fn validate_history(errors: &mut Vec<String>, config: &RoomchatConfig) {
    validate_range(
        errors,
        "history.page_size",
        u64::from(config.history.page_size),
        1,
        200,
    );
}
