pub mod dbpg;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::models::EntityKind;
use crate::ws::userctx::UserCtx;

pub use dbpg::PgStore;
pub use memory::MemoryStore;

/// A persisted page or block as the sync engine sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: String,
    pub kind: EntityKind,
    pub version: i64,
    pub data: Value,
    pub last_edited_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// The document store the sync coordinator arbitrates against.
///
/// The store is the only component that changes entity versions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<StoredEntity>, StoreError>;

    /// Merge `patch` into the entity and persist `version`, but only when the
    /// stored version is strictly below `version`. Returns whether a row
    /// was affected.
    async fn update_if_version_below(
        &self,
        kind: EntityKind,
        id: &str,
        version: i64,
        patch: &Map<String, Value>,
        edited_by: &str,
    ) -> Result<bool, StoreError>;

    /// Delete regardless of version. Returns whether a row was affected.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError>;

    /// Short label for logs and the readiness probe
    fn backend(&self) -> &'static str;
}

/// Identity lookup used by the credential verifier
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<UserCtx>, StoreError>;
}
