use serde::{Deserialize, Serialize};

use crate::models::collab::{CollabEditMessage, CollabUpdateMessage};
use crate::models::presence::{PresenceChangedMessage, PresenceUpdateMessage, UserOfflineMessage};
use crate::models::sync::{SyncAckMessage, SyncErrorMessage, SyncOperationMessage};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// Frames a client may send once its connection is authenticated.
///
/// Every frame is `{"type": <event>, "data": <payload>}`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "data")]
pub enum ReceivedMessage {
    #[serde(rename = "join-workspace")]
    JoinWorkspace(String),
    #[serde(rename = "leave-workspace")]
    LeaveWorkspace(String),
    #[serde(rename = "join-page")]
    JoinPage(String),
    #[serde(rename = "leave-page")]
    LeavePage(String),
    #[serde(rename = "sync:operation")]
    SyncOperation(SyncOperationMessage),
    #[serde(rename = "collab:edit")]
    CollabEdit(CollabEditMessage),
    #[serde(rename = "presence:update")]
    PresenceUpdate(PresenceUpdateMessage),
    #[serde(rename = "ping")]
    Ping,
}

/// Frames the server pushes to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum SendMessage {
    #[serde(rename = "sync:ack")]
    SyncAck(SyncAckMessage),
    #[serde(rename = "sync:error")]
    SyncError(SyncErrorMessage),
    #[serde(rename = "collab:update")]
    CollabUpdate(CollabUpdateMessage),
    #[serde(rename = "presence:changed")]
    PresenceChanged(PresenceChangedMessage),
    #[serde(rename = "user:offline")]
    UserOffline(UserOfflineMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

impl SendMessage {
    /// Event name as it appears in the `type` field
    pub fn event(&self) -> &'static str {
        match self {
            SendMessage::SyncAck(_) => "sync:ack",
            SendMessage::SyncError(_) => "sync:error",
            SendMessage::CollabUpdate(_) => "collab:update",
            SendMessage::PresenceChanged(_) => "presence:changed",
            SendMessage::UserOffline(_) => "user:offline",
            SendMessage::Pong(_) => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collab::EditOperation;
    use serde_json::json;

    #[test]
    fn parses_room_membership_frames() {
        let msg: ReceivedMessage = serde_json::from_str(r#"{"type":"join-workspace","data":"w1"}"#).unwrap();
        assert!(matches!(msg, ReceivedMessage::JoinWorkspace(ref id) if id == "w1"));

        let msg: ReceivedMessage = serde_json::from_str(r#"{"type":"leave-page","data":"p1"}"#).unwrap();
        assert!(matches!(msg, ReceivedMessage::LeavePage(ref id) if id == "p1"));
    }

    #[test]
    fn parses_sync_operation_with_unknown_entity_type() {
        let raw = json!({
            "type": "sync:operation",
            "data": {"operation": "update", "entityType": "comment", "entityId": "c1", "data": {}, "version": 2}
        });
        match serde_json::from_value::<ReceivedMessage>(raw).unwrap() {
            ReceivedMessage::SyncOperation(op) => {
                assert_eq!(op.entity_type, "comment");
                assert_eq!(op.version, Some(2));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn parses_collab_edit_and_ignores_client_stamps() {
        let raw = json!({
            "type": "collab:edit",
            "data": {
                "pageId": "p1", "blockId": "b1", "userId": "spoofed",
                "operation": "insert", "position": 4, "text": "a",
                "timestamp": "1999-01-01T00:00:00Z"
            }
        });
        match serde_json::from_value::<ReceivedMessage>(raw).unwrap() {
            ReceivedMessage::CollabEdit(edit) => {
                assert_eq!(edit.operation, EditOperation::Insert);
                assert_eq!(edit.position, 4);
                assert_eq!(edit.text.as_deref(), Some("a"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn ping_accepts_missing_payload() {
        let msg: ReceivedMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ReceivedMessage::Ping));
    }

    #[test]
    fn outbound_frames_use_event_names() {
        let frame = SendMessage::UserOffline(UserOfflineMessage { user_id: "u1".to_string() });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "user:offline", "data": {"userId": "u1"}})
        );
        assert_eq!(frame.event(), "user:offline");

        let frame = SendMessage::SyncError(SyncErrorMessage { message: "boom".to_string(), entity_id: None });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "sync:error", "data": {"message": "boom"}})
        );
    }
}
