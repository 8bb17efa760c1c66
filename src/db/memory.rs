use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{DocumentStore, StoredEntity, UserDirectory};
use crate::error::StoreError;
use crate::models::EntityKind;
use crate::ws::userctx::UserCtx;

#[derive(Default)]
struct Tables {
    entities: HashMap<(EntityKind, String), StoredEntity>,
    users: HashMap<String, UserCtx>,
}

/// In-process store used when no database is configured, and by tests.
///
/// Every operation runs under a single lock, so each write is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Insert or replace an entity as-is
    pub fn seed_entity(&self, kind: EntityKind, id: &str, version: i64, data: Value) -> Result<(), StoreError> {
        let entity = StoredEntity {
            id: id.to_string(),
            kind,
            version,
            data,
            last_edited_by: None,
            updated_at: Utc::now(),
        };
        self.tables()?.entities.insert((kind, id.to_string()), entity);
        Ok(())
    }

    pub fn seed_user(&self, user: UserCtx) -> Result<(), StoreError> {
        self.tables()?.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn remove_user(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.tables()?.users.remove(id).is_some())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<StoredEntity>, StoreError> {
        Ok(self.tables()?.entities.get(&(kind, id.to_string())).cloned())
    }

    async fn update_if_version_below(
        &self,
        kind: EntityKind,
        id: &str,
        version: i64,
        patch: &Map<String, Value>,
        edited_by: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let Some(entity) = tables.entities.get_mut(&(kind, id.to_string())) else {
            return Ok(false);
        };
        if entity.version >= version {
            return Ok(false);
        }

        match &mut entity.data {
            Value::Object(data) => {
                for (key, value) in patch {
                    data.insert(key.clone(), value.clone());
                }
            }
            other => *other = Value::Object(patch.clone()),
        }
        entity.version = version;
        entity.last_edited_by = Some(edited_by.to_string());
        entity.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
        Ok(self.tables()?.entities.remove(&(kind, id.to_string())).is_some())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<UserCtx>, StoreError> {
        Ok(self.tables()?.users.get(id).cloned())
    }
}
