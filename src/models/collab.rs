use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    Insert,
    Delete,
    Format,
}

/// `collab:edit` payload sent by an editing client.
///
/// Any `userId` or `timestamp` the client puts on the frame is ignored; the
/// relay stamps both from the connection and the server clock.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollabEditMessage {
    pub page_id: String,
    pub block_id: String,
    pub operation: EditOperation,
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

/// `collab:update` relayed to the other members of a page room
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollabUpdateMessage {
    pub page_id: String,
    pub block_id: String,
    pub user_id: String,
    pub operation: EditOperation,
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl CollabUpdateMessage {
    pub fn stamped(edit: CollabEditMessage, user_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            page_id: edit.page_id,
            block_id: edit.block_id,
            user_id: user_id.to_string(),
            operation: edit.operation,
            position: edit.position,
            text: edit.text,
            format: edit.format,
            timestamp,
        }
    }
}
