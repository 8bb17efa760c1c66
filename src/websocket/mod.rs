pub mod handler;
pub mod msg_collab_handler;
pub mod msg_ping_handler;
pub mod msg_presence_handler;
pub mod msg_room_handler;
pub mod msg_sync_handler;

pub use handler::websocket_handler;
