use chrono::Utc;
use tracing::{debug, warn};

use crate::models::{PongMessage, SendMessage};
use crate::ws::{Connection, Delivery};

/// Handle PingMessage - reply with the server time
pub fn handle_ping_message(conn: &Connection) {
    debug!("Ping received on connection {}", conn.id());
    let pong = SendMessage::Pong(PongMessage {
        date: Utc::now().to_rfc3339(),
    });
    if conn.send(pong) != Delivery::Queued {
        warn!("Could not queue pong for connection {}", conn.id());
    }
}
