//! Stable error taxonomy surfaced to the front-end (spec §7).

use serde::{Deserialize, Serialize};

/// Stable string error codes. `Display` renders the exact wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthenticated,
    Forbidden,
    InvalidRequest,
    SchemaVersionUnsupported,
    UnknownTable,
    Conflict,
    ConstraintViolation,
    StorageError,
    SnapshotRowTooLarge,
    SnapshotFormatError,
    CursorAheadOfLog,
    RateLimited,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::SchemaVersionUnsupported => "SCHEMA_VERSION_UNSUPPORTED",
            ErrorCode::UnknownTable => "UNKNOWN_TABLE",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::SnapshotRowTooLarge => "SNAPSHOT_ROW_TOO_LARGE",
            ErrorCode::SnapshotFormatError => "SNAPSHOT_FORMAT_ERROR",
            ErrorCode::CursorAheadOfLog => "CURSOR_AHEAD_OF_LOG",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infrastructural error that aborts the whole request (spec §7 propagation
/// policy). Per-operation failures are carried as `OperationResult::Error`
/// instead and never construct this type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("schema version {got} unsupported (accepted {min}..={max})")]
    SchemaVersionUnsupported { got: u32, min: u32, max: u32 },

    #[error("no handler registered for table {0:?}")]
    UnknownTable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("snapshot row exceeds max frame size ({0} bytes)")]
    SnapshotRowTooLarge(usize),

    #[error("snapshot payload malformed: {0}")]
    SnapshotFormatError(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Unauthenticated => ErrorCode::Unauthenticated,
            SyncError::Forbidden => ErrorCode::Forbidden,
            SyncError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            SyncError::SchemaVersionUnsupported { .. } => ErrorCode::SchemaVersionUnsupported,
            SyncError::UnknownTable(_) => ErrorCode::UnknownTable,
            SyncError::Storage(_) => ErrorCode::StorageError,
            SyncError::SnapshotRowTooLarge(_) => ErrorCode::SnapshotRowTooLarge,
            SyncError::SnapshotFormatError(_) => ErrorCode::SnapshotFormatError,
            SyncError::Cancelled => ErrorCode::Cancelled,
        }
    }
}
