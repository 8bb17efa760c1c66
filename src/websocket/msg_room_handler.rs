use tracing::debug;

use crate::ws::{Connection, RoomKey, RoomRegistry};

pub fn handle_join(registry: &RoomRegistry, conn: &Connection, room: RoomKey) {
    if registry.join(conn.id(), room.clone()) {
        debug!("User {} joined {}", conn.identity().email, room);
    }
}

pub fn handle_leave(registry: &RoomRegistry, conn: &Connection, room: RoomKey) {
    if registry.leave(conn.id(), &room) {
        debug!("User {} left {}", conn.identity().email, room);
    }
}
