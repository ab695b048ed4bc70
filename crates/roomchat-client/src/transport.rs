//! Live channel transport.
//!
//! A [`Connector`] turns a URL into a [`LiveLink`]: a pair of channels
//! that hide the socket. The connection manager only ever talks to the
//! link, which keeps it testable with an in-memory connector.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use roomchat_common::ChatError;

use crate::protocol::{ABNORMAL_CLOSURE, NO_STATUS_CLOSURE};

/// Frames written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Send a close frame with `code` and stop writing.
    Close { code: u16 },
}

/// Frames read from the server. The stream ends with exactly one `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Closed { code: u16 },
}

/// An open live channel.
#[derive(Debug)]
pub struct LiveLink {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::Receiver<Inbound>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a live channel. Resolves once the transport is open.
    async fn connect(&self, url: &str) -> Result<LiveLink, ChatError>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<LiveLink, ChatError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChatError::Network(format!("websocket connect failed: {e}")))?;

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(256);

        // Writer pump.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        if let Err(e) = ws_write.send(WsMessage::Text(text.into())).await {
                            debug!(error = %e, "websocket write failed");
                            break;
                        }
                    }
                    Outbound::Close { code } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: String::new().into(),
                        };
                        let _ = ws_write.send(WsMessage::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        });

        // Reader pump.
        tokio::spawn(async move {
            let code = loop {
                match ws_read.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        let text: &str = &text;
                        if inbound_tx.send(Inbound::Text(text.to_owned())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame.map(|f| u16::from(f.code)).unwrap_or(NO_STATUS_CLOSURE);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        break ABNORMAL_CLOSURE;
                    }
                    None => break ABNORMAL_CLOSURE,
                }
            };
            let _ = inbound_tx.send(Inbound::Closed { code }).await;
        });

        Ok(LiveLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
