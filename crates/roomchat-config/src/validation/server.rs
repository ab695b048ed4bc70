//! Validation for endpoint URLs and REST timeouts.

use crate::schema::RoomchatConfig;

use super::helpers::{validate_range, validate_scheme};

pub(crate) fn validate_server(errors: &mut Vec<String>, config: &RoomchatConfig) {
    let server = &config.server;
    validate_scheme(
        errors,
        "server.api_base_url",
        &server.api_base_url,
        &["http://", "https://"],
    );
    validate_scheme(errors, "server.ws_url", &server.ws_url, &["ws://", "wss://"]);
    validate_range(
        errors,
        "server.request_timeout_secs",
        u64::from(server.request_timeout_secs),
        1,
        120,
    );
    validate_range(
        errors,
        "server.connect_timeout_secs",
        u64::from(server.connect_timeout_secs),
        1,
        60,
    );
}
