//! roomchat configuration system.
//!
//! TOML-based configuration with validation. All config sections use
//! defaults that target a locally running server, so partial configs
//! work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use roomchat_config::{load_config, config_to_json};
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{RoomchatConfig, CONFIG_SCHEMA_VERSION};

use roomchat_common::ConfigError;
use std::path::Path;

/// Load config from `path`, or from the platform default path when `None`.
///
/// The default location gets a commented template on first run. An
/// explicitly given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<RoomchatConfig, ConfigError> {
    match path {
        Some(path) => toml_loader::load_from_path(path),
        None => toml_loader::load_default(),
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &RoomchatConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
