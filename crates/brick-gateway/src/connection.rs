//! WebSocket connection management
//!
//! Connection handles, the pool of open channels and liveness state.

use brick_core::Envelope;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Work queued for a connection's writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Encode and send as a text frame
    Envelope(Envelope),
    /// Transport-level liveness ping
    Probe,
    /// Close handshake, then stop the connection
    Close,
}

/// Handle to a WebSocket connection for sending messages
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection ID
    pub id: String,
    /// Client address
    pub addr: SocketAddr,
    /// Channel for sending work to the connection's writer
    sender: mpsc::UnboundedSender<Outbound>,
    /// Cleared before each probe, set by each transport pong
    alive: Arc<AtomicBool>,
    /// Identifier bound by `join`
    user_id: Arc<RwLock<Option<String>>>,
    /// Cancelled when the connection is terminated
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle writing into `sender`; starts alive and anonymous
    pub fn new(id: String, addr: SocketAddr, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            addr,
            sender,
            alive: Arc::new(AtomicBool::new(true)),
            user_id: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a handle with a fresh id together with its outbound queue
    pub fn channel(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Uuid::new_v4().to_string(), addr, tx), rx)
    }

    /// Queue an envelope for this connection
    pub fn send(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        if self.cancel.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        self.sender
            .send(Outbound::Envelope(envelope))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Queue a transport ping
    pub fn probe(&self) -> Result<(), ConnectionError> {
        self.sender
            .send(Outbound::Probe)
            .map_err(|_| ConnectionError::Closed)
    }

    /// Ask the writer to close the channel gracefully
    pub fn close(&self) -> Result<(), ConnectionError> {
        self.sender
            .send(Outbound::Close)
            .map_err(|_| ConnectionError::Closed)
    }

    /// Record a transport pong
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Clear the liveness flag, returning its previous value
    pub fn clear_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    /// Bind a user id, returning the previously bound one
    pub fn bind_user(&self, user_id: impl Into<String>) -> Option<String> {
        self.user_id.write().replace(user_id.into())
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Forcibly stop the connection; its task drops the socket
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection is terminated
    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// All open connections, keyed by connection id
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn add(&self, handle: ConnectionHandle) {
        self.connections.insert(handle.id.clone(), handle);
    }

    pub fn remove(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.connections.remove(connection_id).map(|(_, handle)| handle)
    }

    /// Point-in-time copy of every handle, safe to iterate while mutating
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Open connections currently bound to `user_id`
    pub fn bound_to(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .filter(|entry| entry.value().user_id().as_deref() == Some(user_id))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Connection-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_liveness_flag() {
        let (handle, _rx) = ConnectionHandle::channel(addr());
        assert!(handle.clear_alive());
        assert!(!handle.clear_alive());
        handle.mark_alive();
        assert!(handle.clear_alive());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_error() {
        let (handle, rx) = ConnectionHandle::channel(addr());
        drop(rx);
        assert!(matches!(
            handle.send(Envelope::Pong),
            Err(ConnectionError::Closed)
        ));
    }

    #[test]
    fn test_send_after_terminate_is_error() {
        let (handle, mut rx) = ConnectionHandle::channel(addr());
        handle.terminate();
        assert!(handle.is_terminated());
        assert!(handle.send(Envelope::Pong).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bind_user_is_shared_between_clones() {
        let (handle, _rx) = ConnectionHandle::channel(addr());
        let clone = handle.clone();
        assert_eq!(handle.bind_user("u1"), None);
        assert_eq!(clone.user_id().as_deref(), Some("u1"));
        assert_eq!(clone.bind_user("u2").as_deref(), Some("u1"));
    }

    #[test]
    fn test_pool_bound_to() {
        let pool = ConnectionPool::new();
        let (a, _ra) = ConnectionHandle::channel(addr());
        let (b, _rb) = ConnectionHandle::channel(addr());
        a.bind_user("u1");
        b.bind_user("u2");
        pool.add(a.clone());
        pool.add(b.clone());

        assert_eq!(pool.count(), 2);
        let bound = pool.bound_to("u1");
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].id, a.id);

        pool.remove(&a.id);
        assert_eq!(pool.count(), 1);
        assert!(pool.remove(&a.id).is_none());
    }
}
