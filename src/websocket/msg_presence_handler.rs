use tracing::debug;

use crate::models::{PresenceChangedMessage, PresenceUpdateMessage, SendMessage};
use crate::ws::{Connection, RoomKey, RoomRegistry};

/// Fan a presence update out to the rest of the workspace.
///
/// Nothing is remembered between calls, so late joiners see no backfill.
pub fn update_presence(registry: &RoomRegistry, conn: &Connection, update: PresenceUpdateMessage) -> usize {
    let room = RoomKey::Workspace(update.workspace_id);
    let changed = PresenceChangedMessage {
        user_id: conn.user_id().to_string(),
        user_name: conn.identity().name.clone(),
        status: update.status,
        page_id: update.page_id,
    };
    let delivered = registry.broadcast(&room, &SendMessage::PresenceChanged(changed), Some(conn.id()));
    debug!("Presence of user {} in {} sent to {} peers", conn.user_id(), room, delivered);
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::userctx::{Identity, UserCtx};

    fn identity(uid: &str, name: &str) -> Identity {
        Identity::new(
            UserCtx {
                id: uid.to_string(),
                name: name.to_string(),
                email: format!("{uid}@example.com"),
            },
            Vec::new(),
        )
    }

    #[test]
    fn presence_goes_to_workspace_peers_with_sender_name() {
        let registry = RoomRegistry::new(8);
        let (a, mut qa) = registry.register(identity("a", "Ada"));
        let (b, mut qb) = registry.register(identity("b", "Bob"));
        registry.join(a.id(), RoomKey::Workspace("w1".to_string()));
        registry.join(b.id(), RoomKey::Workspace("w1".to_string()));

        let delivered = update_presence(
            &registry,
            &a,
            PresenceUpdateMessage {
                workspace_id: "w1".to_string(),
                status: "editing".to_string(),
                page_id: Some("p1".to_string()),
            },
        );

        assert_eq!(delivered, 1);
        assert!(qa.try_recv().is_none());
        assert_eq!(
            qb.try_recv(),
            Some(SendMessage::PresenceChanged(PresenceChangedMessage {
                user_id: "a".to_string(),
                user_name: "Ada".to_string(),
                status: "editing".to_string(),
                page_id: Some("p1".to_string()),
            }))
        );
    }

    #[test]
    fn late_joiner_gets_no_backfill() {
        let registry = RoomRegistry::new(8);
        let (a, _qa) = registry.register(identity("a", "Ada"));
        registry.join(a.id(), RoomKey::Workspace("w1".to_string()));
        update_presence(
            &registry,
            &a,
            PresenceUpdateMessage {
                workspace_id: "w1".to_string(),
                status: "idle".to_string(),
                page_id: None,
            },
        );

        let (b, mut qb) = registry.register(identity("b", "Bob"));
        registry.join(b.id(), RoomKey::Workspace("w1".to_string()));
        assert!(qb.try_recv().is_none());
    }
}
