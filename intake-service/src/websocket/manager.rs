//! WebSocket connection manager.
//!
//! Tracks every open connection together with the user it was
//! authenticated as.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::messages::ServerMessage;

/// State for a single WebSocket connection
pub(crate) struct ConnectionState {
    pub(crate) user_id: String,
    pub(crate) tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Manager for all WebSocket connections
pub struct WebSocketManager {
    pub(crate) connections: DashMap<String, ConnectionState>,
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub(crate) fn add_connection(
        &self,
        session_id: String,
        user_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        debug!(session_id = %session_id, user_id = %user_id, "Adding WebSocket connection");
        self.connections
            .insert(session_id, ConnectionState { user_id, tx });
    }

    pub(crate) fn remove_connection(&self, session_id: &str) {
        debug!(session_id = %session_id, "Removing WebSocket connection");
        self.connections.remove(session_id);
    }

    /// Send a message to a specific connection
    pub fn send_to(&self, session_id: &str, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(session_id)
            && conn.tx.send(msg).is_err()
        {
            warn!(session_id = %session_id, "Failed to send message to connection");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of open connections belonging to a user
    #[cfg(test)]
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .count()
    }
}
