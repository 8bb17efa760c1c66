use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// Kind of document entity a sync operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Page,
    Block,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Page => "page",
            EntityKind::Block => "block",
        }
    }

    /// Postgres table holding entities of this kind
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Page => "pages",
            EntityKind::Block => "blocks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(EntityKind::Page),
            "block" => Ok(EntityKind::Block),
            other => Err(SyncError::UnknownEntityKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Update => f.write_str("update"),
            OperationKind::Delete => f.write_str("delete"),
        }
    }
}

impl FromStr for OperationKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(SyncError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// `sync:operation` payload as it arrives on the wire.
///
/// Kinds stay as raw strings here so that an unknown kind turns into a typed
/// `sync:error` reply instead of a frame that fails to parse.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperationMessage {
    pub operation: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub version: Option<i64>,
}

/// A validated mutation request against the document store
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    Update {
        entity: EntityKind,
        entity_id: String,
        patch: Map<String, Value>,
        version: i64,
        user_id: String,
    },
    Delete {
        entity: EntityKind,
        entity_id: String,
        version: Option<i64>,
        user_id: String,
    },
}

impl SyncOperation {
    /// Validate a wire message submitted by `user_id`.
    ///
    /// Entity kind is checked before the operation kind.
    pub fn from_message(msg: SyncOperationMessage, user_id: &str) -> Result<Self, SyncError> {
        let entity: EntityKind = msg.entity_type.parse()?;
        let operation: OperationKind = msg.operation.parse()?;

        match operation {
            OperationKind::Update => {
                let version = msg.version.ok_or_else(|| {
                    SyncError::InvalidOperation(format!(
                        "Update of {} {} requires a version",
                        entity, msg.entity_id
                    ))
                })?;
                let patch = sanitize_patch(msg.data)?;
                Ok(SyncOperation::Update {
                    entity,
                    entity_id: msg.entity_id,
                    patch,
                    version,
                    user_id: user_id.to_string(),
                })
            }
            OperationKind::Delete => Ok(SyncOperation::Delete {
                entity,
                entity_id: msg.entity_id,
                version: msg.version,
                user_id: user_id.to_string(),
            }),
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            SyncOperation::Update { entity, .. } | SyncOperation::Delete { entity, .. } => *entity,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            SyncOperation::Update { entity_id, .. } | SyncOperation::Delete { entity_id, .. } => entity_id,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            SyncOperation::Update { .. } => OperationKind::Update,
            SyncOperation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn version(&self) -> Option<i64> {
        match self {
            SyncOperation::Update { version, .. } => Some(*version),
            SyncOperation::Delete { version, .. } => *version,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            SyncOperation::Update { user_id, .. } | SyncOperation::Delete { user_id, .. } => user_id,
        }
    }
}

/// Keys the store owns; a client patch never overrides them.
const RESERVED_KEYS: [&str; 3] = ["id", "version", "lastEditedBy"];

/// Turn a client payload into a top-level merge patch.
pub fn sanitize_patch(data: Value) -> Result<Map<String, Value>, SyncError> {
    let mut patch = match data {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        _ => {
            return Err(SyncError::InvalidOperation(
                "Sync payload must be a JSON object".to_string(),
            ))
        }
    };
    for key in RESERVED_KEYS {
        patch.remove(key);
    }
    Ok(patch)
}

/// What the store did with an operation.
///
/// `applied == false` on an update means the stored version was already at
/// or beyond the submitted one (or the entity is absent). It is still
/// acknowledged as a success on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub entity_id: String,
    pub version: Option<i64>,
    pub applied: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncAckMessage {
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<i64>,
    pub success: bool,
}

impl From<&SyncOutcome> for SyncAckMessage {
    fn from(outcome: &SyncOutcome) -> Self {
        Self {
            entity_id: outcome.entity_id.clone(),
            version: outcome.version,
            success: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entity_id: Option<String>,
}
