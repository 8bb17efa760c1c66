use chrono::Utc;
use tracing::debug;

use crate::models::{CollabEditMessage, CollabUpdateMessage, SendMessage};
use crate::ws::{Connection, RoomKey, RoomRegistry};

/// Relay a live edit to everyone else on the page.
///
/// Advisory only: nothing is persisted or version-checked and the sender
/// gets no reply. Returns how many peers had the update queued.
pub fn relay_edit(registry: &RoomRegistry, conn: &Connection, edit: CollabEditMessage) -> usize {
    let room = RoomKey::Page(edit.page_id.clone());
    let update = CollabUpdateMessage::stamped(edit, conn.user_id(), Utc::now());
    let delivered = registry.broadcast(&room, &SendMessage::CollabUpdate(update), Some(conn.id()));
    debug!("Collaboration edit on {} by user {} relayed to {} peers", room, conn.user_id(), delivered);
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EditOperation;
    use crate::ws::userctx::{Identity, UserCtx};

    fn identity(uid: &str) -> Identity {
        Identity::new(
            UserCtx {
                id: uid.to_string(),
                name: uid.to_string(),
                email: format!("{uid}@example.com"),
            },
            Vec::new(),
        )
    }

    #[test]
    fn edit_reaches_page_peers_but_not_sender() {
        let registry = RoomRegistry::new(8);
        let (u, mut qu) = registry.register(identity("u"));
        let (v, mut qv) = registry.register(identity("v"));
        let (w, mut qw) = registry.register(identity("w"));
        registry.join(u.id(), RoomKey::Page("P".to_string()));
        registry.join(v.id(), RoomKey::Page("P".to_string()));
        registry.join(w.id(), RoomKey::Page("other".to_string()));

        let before = Utc::now();
        let delivered = relay_edit(
            &registry,
            &u,
            CollabEditMessage {
                page_id: "P".to_string(),
                block_id: "b1".to_string(),
                operation: EditOperation::Format,
                position: 7,
                text: None,
                format: Some(serde_json::json!({"bold": true})),
            },
        );

        assert_eq!(delivered, 1);
        assert!(qu.try_recv().is_none());
        assert!(qw.try_recv().is_none());
        match qv.try_recv() {
            Some(SendMessage::CollabUpdate(update)) => {
                assert_eq!(update.user_id, "u");
                assert_eq!(update.block_id, "b1");
                assert_eq!(update.position, 7);
                assert!(update.timestamp >= before);
            }
            other => panic!("expected collab:update, got {other:?}"),
        }
    }
}
