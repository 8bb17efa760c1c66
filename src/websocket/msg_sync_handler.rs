use tracing::warn;

use crate::models::SyncOperationMessage;
use crate::services::SyncCoordinator;
use crate::ws::{Connection, Delivery};

/// Handle a `sync:operation` frame; the reply goes to the sender only
pub async fn handle_sync_message(coordinator: &SyncCoordinator, conn: &Connection, msg: SyncOperationMessage) {
    let reply = coordinator.apply_sync(conn, msg).await;
    let event = reply.event();
    if conn.send(reply) != Delivery::Queued {
        warn!("Could not queue {} for connection {}", event, conn.id());
    }
}
