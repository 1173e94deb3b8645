//! WebSocket message types.
//!
//! Defines the client-to-server and server-to-client message formats.

use serde::{Deserialize, Serialize};

use crate::db::models::{DocumentStatus, ProcessingQueueItem};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive ping
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the upgrade
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A queue item of one of the user's documents changed
    ProcessingUpdate(ProcessingUpdate),
    /// Keepalive pong response
    Pong { timestamp: u64 },
    /// Error message
    Error { code: String, message: String },
}

/// Queue item snapshot plus the document status it corresponds to
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingUpdate {
    #[serde(flatten)]
    pub item: ProcessingQueueItem,
    pub document_status: DocumentStatus,
}

impl From<ProcessingUpdate> for ServerMessage {
    fn from(update: ProcessingUpdate) -> Self {
        ServerMessage::ProcessingUpdate(update)
    }
}
