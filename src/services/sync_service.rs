use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::DocumentStore;
use crate::error::SyncError;
use crate::models::{SendMessage, SyncAckMessage, SyncErrorMessage, SyncOperation, SyncOperationMessage, SyncOutcome};
use crate::ws::Connection;

/// Applies version-gated mutations against the document store.
///
/// Holds no version state of its own; every decision is the store's.
#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn DocumentStore>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Run one validated operation.
    ///
    /// An update whose version is not newer than the stored one is not an
    /// error: it comes back with `applied == false`. Deletes ignore versions.
    pub async fn apply(&self, op: &SyncOperation) -> Result<SyncOutcome, SyncError> {
        let applied = match op {
            SyncOperation::Update {
                entity,
                entity_id,
                patch,
                version,
                user_id,
            } => {
                self.store
                    .update_if_version_below(*entity, entity_id, *version, patch, user_id)
                    .await?
            }
            SyncOperation::Delete { entity, entity_id, .. } => self.store.delete(*entity, entity_id).await?,
        };

        Ok(SyncOutcome {
            entity_id: op.entity_id().to_string(),
            version: op.version(),
            applied,
        })
    }

    /// Handle a `sync:operation` frame from `conn` and build the reply.
    ///
    /// Never fails: every error becomes a `sync:error` for the sender.
    pub async fn apply_sync(&self, conn: &Connection, msg: SyncOperationMessage) -> SendMessage {
        let entity_id = msg.entity_id.clone();
        debug!(
            "Sync operation: {} on {} {} by user {}",
            msg.operation,
            msg.entity_type,
            msg.entity_id,
            conn.user_id()
        );

        let result = match SyncOperation::from_message(msg, conn.user_id()) {
            Ok(op) => self.apply(&op).await.map(|outcome| (op, outcome)),
            Err(e) => Err(e),
        };

        match result {
            Ok((op, outcome)) => {
                if outcome.applied {
                    info!(
                        "Applied {} of {} {} at version {:?} for user {}",
                        op.kind(),
                        op.entity(),
                        outcome.entity_id,
                        outcome.version,
                        op.user_id()
                    );
                } else {
                    // Stale version or absent entity; acknowledged as success
                    debug!(
                        "No-op {} of {} {} at version {:?} for user {}",
                        op.kind(),
                        op.entity(),
                        outcome.entity_id,
                        outcome.version,
                        op.user_id()
                    );
                }
                SendMessage::SyncAck(SyncAckMessage::from(&outcome))
            }
            Err(e) => {
                error!("Sync error on {} for user {}: {}", entity_id, conn.user_id(), e);
                SendMessage::SyncError(SyncErrorMessage {
                    message: e.to_string(),
                    entity_id: Some(entity_id),
                })
            }
        }
    }
}
