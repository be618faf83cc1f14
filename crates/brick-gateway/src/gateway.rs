//! Gateway main structure
//!
//! The WebSocket server that accepts chat channels, feeds their frames to
//! the [`ChatRouter`] and runs the periodic liveness sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use brick_core::Envelope;
use brick_responder::ResponseGenerator;
use brick_session::MessageLog;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionHandle, ConnectionPool, Outbound};
use crate::router::{ChatRouter, RouterSettings};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:8090")
    pub bind: String,
    /// Upgrade path for chat channels
    pub path: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Period of the liveness sweep
    pub liveness_interval: Duration,
    pub router: RouterSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8090".to_string(),
            path: "/ws".to_string(),
            max_connections: 1000,
            liveness_interval: Duration::from_secs(30),
            router: RouterSettings::default(),
        }
    }
}

/// Point-in-time gateway counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub active_connections: usize,
    pub joined_users: usize,
    pub max_connections: usize,
}

/// The chat WebSocket server
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
    router: Arc<ChatRouter>,
    /// One permit per connection slot, taken before the upgrade
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a new Gateway instance
    pub fn new(
        config: GatewayConfig,
        log: Arc<dyn MessageLog>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let pool = Arc::new(ConnectionPool::new());
        let router = Arc::new(ChatRouter::new(config.router.clone(), pool, log, generator));
        let slots = Arc::new(Semaphore::new(
            config.max_connections.min(Semaphore::MAX_PERMITS),
        ));
        Self {
            config,
            router,
            slots,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> &ChatRouter {
        &self.router
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            active_connections: self.router.pool().count(),
            joined_users: self.router.registry().len(),
            max_connections: self.config.max_connections,
        }
    }

    /// Stop accepting, close every channel and end the sweep
    pub fn shutdown(&self) {
        info!("Gateway shutting down");
        self.shutdown.cancel();
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = self.config.bind.parse()?;
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve chat channels on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let local = listener.local_addr()?;
        info!("Gateway listening on ws://{}{}", local, self.config.path);

        let sweeper = self.spawn_liveness_sweep();

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };
            debug!("New connection from {}", peer_addr);

            let slot = match self.slots.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Connection limit reached, rejecting {}", peer_addr);
                    tokio::spawn(async move {
                        if let Err(e) = reject_connection(stream, "Server at capacity").await {
                            debug!("Failed to reject {}: {}", peer_addr, e);
                        }
                    });
                    continue;
                }
            };

            let gateway = self.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_connection(stream, peer_addr, slot).await {
                    error!("Connection error for {}: {}", peer_addr, e);
                }
            });
        }

        sweeper.abort();
        Ok(())
    }

    fn spawn_liveness_sweep(&self) -> tokio::task::JoinHandle<()> {
        let router = self.router.clone();
        let shutdown = self.shutdown.clone();
        let period = self.config.liveness_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = router.liveness_sweep();
                        if report.evicted > 0 {
                            info!(
                                probed = report.probed,
                                evicted = report.evicted,
                                "Liveness sweep evicted connections"
                            );
                        }
                        debug!(
                            probed = report.probed,
                            active_connections = router.pool().count(),
                            joined_users = router.registry().len(),
                            "Liveness sweep"
                        );
                    }
                }
            }
        })
    }

    /// Handle a WebSocket connection; `_slot` is released when it returns
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        _slot: OwnedSemaphorePermit,
    ) -> Result<(), GatewayError> {
        let path = self.config.path.clone();
        let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
            if req.uri().path() == path {
                Ok(resp)
            } else {
                let mut not_found = ErrorResponse::new(Some("Not Found".to_string()));
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Err(not_found)
            }
        })
        .await?;
        let (mut sender, mut receiver) = ws_stream.split();

        let (conn, mut rx) = ConnectionHandle::channel(addr);
        self.router.accept(&conn);
        info!(connection_id = %conn.id, "Connection {} opened", addr);

        loop {
            tokio::select! {
                _ = conn.terminated() => {
                    debug!(connection_id = %conn.id, "Connection terminated");
                    break;
                }

                _ = self.shutdown.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }

                Some(outbound) = rx.recv() => {
                    let frame = match outbound {
                        Outbound::Envelope(envelope) => match envelope.encode() {
                            Ok(json) => Message::Text(json),
                            Err(e) => {
                                error!("Failed to serialize envelope: {}", e);
                                continue;
                            }
                        },
                        Outbound::Probe => Message::Ping(Vec::new()),
                        Outbound::Close => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    };
                    if let Err(e) = sender.send(frame).await {
                        error!("Failed to send to {}: {}", addr, e);
                        break;
                    }
                }

                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.router.handle_frame(&conn, &text).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            self.router.reject(&conn, "Binary frames are not supported");
                        }
                        Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sender.send(Message::Pong(data)).await {
                                error!("Failed to send pong: {}", e);
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Connection {} closed", addr);
                            break;
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket error on {}: {}", addr, e);
                            break;
                        }
                    }
                }
            }
        }

        self.router.on_close(&conn);
        info!(connection_id = %conn.id, "Connection {} disconnected", addr);

        Ok(())
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gateway({})", self.config.bind)
    }
}

/// Accept the upgrade only to report why the channel cannot be served
async fn reject_connection(stream: TcpStream, reason: &str) -> Result<(), GatewayError> {
    let ws_stream = accept_async(stream).await?;
    let (mut sender, _) = ws_stream.split();
    let json = Envelope::error(reason).encode()?;
    sender.send(Message::Text(json)).await?;
    sender.close().await?;
    Ok(())
}

/// Gateway-related errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] brick_core::FrameError),
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}
