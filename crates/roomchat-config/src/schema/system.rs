//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The `tracing` directive for the roomchat crates at this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "roomchat=trace",
            LogLevel::Debug => "roomchat=debug",
            LogLevel::Info => "roomchat=info",
            LogLevel::Warn => "roomchat=warn",
            LogLevel::Error => "roomchat=error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
