//! Transport seam between the controller and a real WebSocket

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// What the transport reports back to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame
    Frame(String),
    /// The transport failed; a `Closed` always follows
    Error(String),
    Closed,
}

/// An open transport.
///
/// Dropping `outgoing` closes the underlying connection.
#[derive(Debug)]
pub struct TransportPair {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transports for the channel controller
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<TransportPair>;
}

/// `tokio-tungstenite` backed connector
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<TransportPair> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let url = url.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = out_rx.recv() => match frame {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        None => {
                            debug!("Closing channel to {}", url);
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    },
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if in_tx.send(TransportEvent::Frame(text)).is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket read error on {}: {}", url, e);
                            let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    },
                }
            }
            let _ = in_tx.send(TransportEvent::Closed);
        });

        Ok(TransportPair {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
