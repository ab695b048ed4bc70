//! History and submit over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use tracing::debug;

use roomchat_common::{ChatError, RoomId};
use roomchat_config::schema::ServerConfig;

use crate::auth::Authenticator;
use crate::protocol::{ErrorBody, HistoryPage, HistoryResponse, SubmitPayload};

/// Source of paginated room history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch up to `limit` messages older than `cursor` (newest when `None`).
    async fn fetch_page(
        &self,
        room: &RoomId,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, ChatError>;
}

/// Reliable request/response path for outgoing messages.
#[async_trait]
pub trait SubmitChannel: Send + Sync {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), ChatError>;
}

// ---------------------------------------------------------------------------
// RestClient
// ---------------------------------------------------------------------------

/// `reqwest` implementation of both [`HistorySource`] and [`SubmitChannel`].
pub struct RestClient {
    base_url: Url,
    http: reqwest::Client,
    auth: Arc<dyn Authenticator>,
}

impl RestClient {
    pub fn new(config: &ServerConfig, auth: Arc<dyn Authenticator>) -> Result<Self, ChatError> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            ChatError::Network(format!("invalid api base url {}: {e}", config.api_base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::Network(format!(
                "api base url cannot carry a path: {}",
                config.api_base_url
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(u64::from(config.connect_timeout_secs)))
            .timeout(Duration::from_secs(u64::from(config.request_timeout_secs)))
            .build()
            .map_err(|e| ChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            auth,
        })
    }

    /// `{base}/{room}/messages?limit=<n>[&cursor=<c>]`
    pub(crate) fn messages_url(&self, room: &RoomId, limit: u32, cursor: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(room.as_str()).push("messages");
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        url
    }

    /// `{base}/submit`
    pub(crate) fn submit_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("submit");
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.current_credential() {
            Some(credential) => request.bearer_auth(credential.token()),
            None => request,
        }
    }
}

/// The server's `{"error": ...}` message, or the status line.
async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(ErrorBody { error: Some(error) }) if !error.is_empty() => error,
        _ => format!("HTTP {status}"),
    }
}

#[async_trait]
impl HistorySource for RestClient {
    async fn fetch_page(
        &self,
        room: &RoomId,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, ChatError> {
        let url = self.messages_url(room, limit, cursor);
        debug!(room = %room, limit, cursor = cursor.unwrap_or(""), "fetching history page");

        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| ChatError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Fetch(error_message(response).await));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Fetch(format!("invalid history response: {e}")))?;
        Ok(body.into())
    }
}

#[async_trait]
impl SubmitChannel for RestClient {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), ChatError> {
        debug!(room = %payload.room_id, "submitting message over http");

        let response = self
            .authorize(self.http.post(self.submit_url()))
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::Send(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Send(error_message(response).await));
        }
        Ok(())
    }
}
