//! Full configuration validation.
//!
//! Each section has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod connection;
mod helpers;
mod server;


use crate::schema::RoomchatConfig;
use roomchat_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &RoomchatConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    server::validate_server(&mut errors, config);
    connection::validate_connection(&mut errors, config);
    connection::validate_history(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
