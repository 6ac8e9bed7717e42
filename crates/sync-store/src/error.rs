use sync_wire::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to database: {0}")]
    Connect(String),

    #[error("schema setup failed: {0}")]
    Schema(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("append_commit exhausted {0} retries under serialization conflicts")]
    RetriesExhausted(u32),

    #[error(transparent)]
    Chunk(#[from] sync_wire::SyncError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Chunk(inner) => inner,
            other => SyncError::Storage(other.to_string()),
        }
    }
}

/// True if `err` is a Postgres serialization failure (SQLSTATE `40001`),
/// retriable by re-running the enclosing transaction from scratch.
pub fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("40001")
    )
}
