//! Credential supply.
//!
//! Acquiring and refreshing tokens happens elsewhere (login, registration,
//! token refresh). The client only asks for the current credential, on
//! every connection attempt and every request, and never mutates it.

use roomchat_common::Credential;

/// Supplies the bearer credential on demand.
///
/// `None` does not block connecting: anonymous viewers may read a room,
/// and anything that needs a user is rejected by the server itself.
pub trait Authenticator: Send + Sync {
    fn current_credential(&self) -> Option<Credential>;
}

/// A fixed credential, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    credential: Option<Credential>,
}

impl StaticAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        Self {
            credential: token.filter(|t| !t.is_empty()).map(Credential::new),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl Authenticator for StaticAuthenticator {
    fn current_credential(&self) -> Option<Credential> {
        self.credential.clone()
    }
}

/// Reads the token from an environment variable on every call, so a token
/// rotated by an external login tool is picked up on the next reconnect.
#[derive(Debug, Clone)]
pub struct EnvAuthenticator {
    var: String,
}

impl EnvAuthenticator {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Authenticator for EnvAuthenticator {
    fn current_credential(&self) -> Option<Credential> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Credential::new)
    }
}
