//! Session registry
//!
//! Binds a logical user id to at most one live connection. Every removal
//! is guarded by the connection id so that a slow disconnect of a
//! superseded channel can never evict the session that replaced it.

use dashmap::DashMap;

use crate::connection::ConnectionHandle;

/// A user's current binding
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub connection: ConnectionHandle,
}

impl Session {
    pub fn new(user_id: impl Into<String>, connection: ConnectionHandle) -> Self {
        Self {
            user_id: user_id.into(),
            connection,
        }
    }
}

/// Manages user id to connection bindings
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `connection`, returning the session it replaced
    pub fn insert_or_replace(
        &self,
        user_id: &str,
        connection: ConnectionHandle,
    ) -> Option<Session> {
        self.sessions
            .insert(user_id.to_string(), Session::new(user_id, connection))
    }

    /// Remove the binding for `user_id` only if it still points at
    /// `connection_id`
    pub fn remove_if_current(&self, user_id: &str, connection_id: &str) -> bool {
        self.sessions
            .remove_if(user_id, |_, session| session.connection.id == connection_id)
            .is_some()
    }

    pub fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.get(user_id).map(|entry| entry.value().clone())
    }

    /// Connection id currently bound to `user_id`
    pub fn current_connection_id(&self, user_id: &str) -> Option<String> {
        self.sessions
            .get(user_id)
            .map(|entry| entry.value().connection.id.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
