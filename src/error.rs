use thiserror::Error;

/// Failures raised by a document store or user directory
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors of the sync engine.
///
/// Only `Unauthenticated` is fatal to a connection. Everything else is
/// caught at the operation boundary and turned into a `sync:error` reply.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntityKind(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        SyncError::Unauthenticated(reason.into())
    }
}
