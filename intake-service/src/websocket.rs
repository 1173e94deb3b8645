//! WebSocket feed for real-time processing updates
//!
//! Clients connect to `/ws` after authenticating and receive every queue item
//! change for their own documents without polling.

mod broadcast;
mod handlers;
mod manager;
mod messages;

pub use handlers::handle_ws_connection;
pub use manager::WebSocketManager;
pub use messages::ProcessingUpdate;
