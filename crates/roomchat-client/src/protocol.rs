//! Wire frames for the live channel and the REST API.
//!
//! Frame kinds are discriminated by the `type` tag: `"auth"` is reserved
//! for handshake replies and everything else must be a chat message.

use serde::{Deserialize, Serialize};

use roomchat_common::{ChatError, Message, RoomId};

/// Clean closure: intentional disconnect, never reconnected.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Synthesized for transport errors, handshake failures and timeouts.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Peer closed without sending a status code.
pub const NO_STATUS_CLOSURE: u16 = 1005;

const AUTH_FRAME_TYPE: &str = "auth";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Frames the client writes to the live channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Auth { token: String },
    Submit(SubmitPayload),
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Body of a submit, identical on the live channel and the REST fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayload {
    pub room_id: RoomId,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A classified frame received from the live channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    AuthAccepted,
    AuthRejected { reason: String },
    Message(Message),
}

#[derive(Deserialize)]
struct AuthReply {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

impl ServerFrame {
    /// Classify a text frame. Anything that is neither a well-formed auth
    /// reply nor a complete message is a [`ChatError::Parse`].
    pub fn parse(text: &str) -> Result<Self, ChatError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ChatError::Parse("frame is not a JSON object".into()));
        }

        let is_auth = value.get("type").and_then(|t| t.as_str()) == Some(AUTH_FRAME_TYPE);
        if is_auth {
            let reply: AuthReply = serde_json::from_value(value)?;
            return match reply.status.as_str() {
                "success" => Ok(ServerFrame::AuthAccepted),
                "error" => Ok(ServerFrame::AuthRejected {
                    reason: reply
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| "authentication failed".into()),
                }),
                other => Err(ChatError::Parse(format!("unknown auth status: {other}"))),
            };
        }

        let message: Message = serde_json::from_value(value)?;
        Ok(ServerFrame::Message(message))
    }
}

// ---------------------------------------------------------------------------
// REST bodies
// ---------------------------------------------------------------------------

/// One page of history, newest page first from the server's point of view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryPage {
    pub items: Vec<Message>,
    /// Boundary for the next older page; `None` means no more history.
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    items: Option<Vec<Message>>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl From<HistoryResponse> for HistoryPage {
    fn from(resp: HistoryResponse) -> Self {
        Self {
            items: resp.items.unwrap_or_default(),
            next_cursor: resp.next_cursor.filter(|c| !c.is_empty()),
        }
    }
}

/// `{"error": "..."}` as returned on non-2xx responses.
#[derive(Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) error: Option<String>,
}
