use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{DocumentStore, StoredEntity, UserDirectory};
use crate::error::StoreError;
use crate::models::EntityKind;
use crate::ws::userctx::UserCtx;

/// Postgres-backed document store and user directory
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    async fn begin(&self, what: &str, id: &str) -> Result<sqlx::Transaction<'_, sqlx::Postgres>, SqlxError> {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        debug!(
            "{} {}. Pool connections: {} idle, {} in use",
            what,
            id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        self.pool.begin().await.map_err(|e| {
            error!(
                "Failed to acquire connection from pool for {}: {}. Pool state: {} idle, {} total",
                id,
                e,
                self.pool.num_idle(),
                self.pool.size()
            );
            e
        })
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<StoredEntity>, StoreError> {
        // Table names come from a closed enum, never from client input
        let query_sql = format!(
            "SELECT id, version, data, last_edited_by, updated_at FROM {} WHERE id = $1",
            kind.table()
        );

        let row = sqlx::query(&query_sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: Json<Value> = row.try_get("data")?;
                Ok(Some(StoredEntity {
                    id: row.try_get("id")?,
                    kind,
                    version: row.try_get("version")?,
                    data: data.0,
                    last_edited_by: row.try_get("last_edited_by")?,
                    updated_at: row.try_get("updated_at")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn update_if_version_below(
        &self,
        kind: EntityKind,
        id: &str,
        version: i64,
        patch: &Map<String, Value>,
        edited_by: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin("Updating", id).await?;

        let update_sql = format!(
            r#"
            UPDATE {}
            SET data = data || $1,
                version = $2,
                last_edited_by = $3,
                updated_at = NOW()
            WHERE id = $4 AND version < $2
            "#,
            kind.table()
        );

        let result = sqlx::query(&update_sql)
            .bind(Json(Value::Object(patch.clone())))
            .bind(version)
            .bind(edited_by)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Dropping an uncommitted transaction rolls it back
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.begin("Deleting", id).await?;

        let delete_sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&delete_sql).bind(id).execute(&mut *tx).await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, id: &str) -> Result<Option<UserCtx>, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(UserCtx {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            })),
            None => Ok(None),
        }
    }
}
