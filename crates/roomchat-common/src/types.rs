use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name given to messages that arrive without one from a
/// server-originated (empty `userId`) sender.
pub const BOT_USER_NAME: &str = "Bot";

/// Message kind assumed when the server omits `type`.
pub const DEFAULT_MESSAGE_TYPE: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Bearer credential handed out by the authenticator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// A chat message as delivered by the server. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawMessage")]
pub struct Message {
    pub id: String,
    pub room_id: RoomId,
    /// Empty for server/bot originated messages.
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_bot(&self) -> bool {
        self.user_id.is_empty()
    }
}

/// Wire shape before defaults are applied. `id`, `roomId` and `text`
/// are mandatory; everything else is filled in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    room_id: RoomId,
    text: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let user_id = raw.user_id.unwrap_or_default();
        let user_name = match raw.user_name {
            Some(name) if !name.is_empty() => name,
            Some(name) if !user_id.is_empty() => name,
            _ => BOT_USER_NAME.to_string(),
        };
        let kind = raw
            .kind
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());

        Self {
            id: raw.id,
            room_id: raw.room_id,
            user_id,
            user_name,
            text: raw.text,
            kind,
            created_at: raw.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Room metadata. Owned by room management, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    pub title: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// A connection attempt is underway or established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating | ConnectionState::Connected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}
