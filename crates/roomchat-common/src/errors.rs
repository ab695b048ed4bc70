use std::path::PathBuf;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Every failure a public client operation can resolve to.
///
/// The first five variants map one-to-one onto the failure kinds the
/// presentation layer distinguishes: an auth rejection needs a manual
/// reconnect, network failures are retried, parse failures stay local,
/// send failures sit next to the input and fetch failures become a
/// retryable banner.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed frame: {0}")]
    Parse(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("history fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("client is shut down")]
    Closed,
}

impl ChatError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Network(_) | ChatError::Fetch(_))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Parse(err.to_string())
    }
}
