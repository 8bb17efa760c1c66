use moka::future::Cache;
use std::time::Duration;
use tracing::{error, info};

use crate::db::UserDirectory;
use crate::error::StoreError;

/// A user record as held by the user directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserCtx {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// The authenticated identity attached to a connection.
///
/// Only the credential verifier hands these out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub(crate) fn new(user: UserCtx, roles: Vec<String>) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Short-lived cache in front of the user directory.
///
/// The TTL bounds how long a deleted user can keep opening connections.
pub struct UserCtxCache {
    cache: Option<Cache<String, UserCtx>>,
}

impl UserCtxCache {
    /// A TTL of zero disables caching entirely
    pub fn new(ttl: Duration) -> Self {
        if ttl.is_zero() {
            info!("User context cache disabled");
            return Self { cache: None };
        }
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        info!("User context cache initialized (ttl {}s)", ttl.as_secs());
        Self { cache: Some(cache) }
    }

    pub async fn get_or_fetch(
        &self,
        uid: &str,
        directory: &dyn UserDirectory,
    ) -> Result<Option<UserCtx>, StoreError> {
        if let Some(cache) = &self.cache {
            if let Some(ctx) = cache.get(uid).await {
                return Ok(Some(ctx));
            }
        }

        let fetched = directory.find_user(uid).await.map_err(|e| {
            error!("Failed to look up user {}: {}", uid, e);
            e
        })?;

        if let (Some(cache), Some(ctx)) = (&self.cache, &fetched) {
            cache.insert(uid.to_string(), ctx.clone()).await;
        }
        Ok(fetched)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, |c| c.entry_count())
    }
}
