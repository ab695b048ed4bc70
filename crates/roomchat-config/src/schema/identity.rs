//! Identity used when submitting messages.

use serde::{Deserialize, Serialize};

/// Who this client speaks as. The token itself is never stored in the
/// file; it is read from `token_env` each time a credential is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: String,
    pub user_name: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            user_name: String::new(),
            token_env: "ROOMCHAT_TOKEN".into(),
        }
    }
}
