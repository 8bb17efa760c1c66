use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdateMessage {
    pub workspace_id: String,
    pub status: String,
    #[serde(default)]
    pub page_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChangedMessage {
    pub user_id: String,
    pub user_name: String,
    pub status: String,
    pub page_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserOfflineMessage {
    pub user_id: String,
}
