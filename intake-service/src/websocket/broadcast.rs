//! Per-user broadcast of processing updates.

use tracing::debug;

use super::manager::WebSocketManager;
use super::messages::{ProcessingUpdate, ServerMessage};

impl WebSocketManager {
    /// Send a processing update to every connection of the document owner.
    /// Returns how many connections received it.
    pub fn broadcast_processing_update(&self, user_id: &str, update: ProcessingUpdate) -> usize {
        let msg: ServerMessage = update.into();
        let mut sent_count = 0;

        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn.user_id == user_id && conn.tx.send(msg.clone()).is_ok() {
                sent_count += 1;
            }
        }

        if sent_count > 0 {
            debug!(
                user_id = %user_id,
                sent_count = sent_count,
                "Broadcast processing update"
            );
        }
        sent_count
    }
}
