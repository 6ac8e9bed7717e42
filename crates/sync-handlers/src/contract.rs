//! The `TableHandler` contract (spec §4.3).
//!
//! Generic over `Tx`, the per-backend transaction handle, so this crate
//! stays free of any concrete database dependency: `sync-store` supplies
//! `Tx = sqlx::Transaction<'_, sqlx::Any>` (or a concrete `Postgres`/
//! `Sqlite` transaction) when it registers handlers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use sync_wire::{Operation, OperationStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("domain constraint violated: {0}")]
    Constraint(String),
}

/// Context passed to [`TableHandler::snapshot`].
pub struct SnapshotContext {
    pub partition: String,
    /// Fully-expanded, single-valued scope values (the Cartesian product
    /// has already been resolved by the pull pipeline).
    pub scope_values: BTreeMap<String, String>,
    pub as_of_commit_seq: i64,
    pub cursor: Option<String>,
    pub limit: u32,
}

/// One page of a bootstrap snapshot.
pub struct SnapshotPage {
    pub rows: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// Context passed to [`TableHandler::apply_operation`].
pub struct ApplyContext {
    pub actor_id: String,
    pub partition: String,
}

/// One row-level effect a handler wants the core to persist as part of the
/// enclosing commit.
#[derive(Debug, Clone)]
pub struct EmittedChange {
    pub table: String,
    pub row_id: String,
    pub op: OperationStatus,
    pub row_json: Option<Value>,
    pub row_version: Option<i64>,
    pub scopes: BTreeMap<String, String>,
}

/// Result of applying a single operation (spec §4.3 / §4.5).
#[derive(Debug, Clone)]
pub enum ApplyResult {
    Applied,
    Conflict {
        server_version: Option<i64>,
        server_row: Option<Value>,
        message: String,
    },
    Error {
        code: String,
        error: String,
        retriable: bool,
    },
}

pub struct ApplyOutcome {
    pub result: ApplyResult,
    pub emitted_changes: Vec<EmittedChange>,
}

#[async_trait]
pub trait TableHandler<Tx>: Send + Sync {
    /// Table name this handler owns.
    fn table(&self) -> &str;

    /// Scope patterns this handler emits and accepts (spec §4.2).
    fn scope_patterns(&self) -> &[sync_scope::Pattern];

    /// Produce the effective subscription scopes for an authenticated
    /// caller.
    fn resolve_scopes(
        &self,
        actor_id: &str,
        partition: &str,
        params: Option<&Value>,
    ) -> BTreeMap<String, sync_wire::ScopeValue>;

    /// Extract a change's stored, single-valued scopes from a row.
    fn extract_scopes(&self, row: &Value) -> BTreeMap<String, String>;

    /// Deterministic read of the table's logical state as of
    /// `ctx.as_of_commit_seq`.
    async fn snapshot(&self, ctx: &SnapshotContext) -> Result<SnapshotPage, HandlerError>;

    /// Apply one operation inside the enclosing push transaction.
    async fn apply_operation(
        &self,
        tx: &mut Tx,
        ctx: &ApplyContext,
        operation: &Operation,
        op_index: usize,
    ) -> Result<ApplyOutcome, HandlerError>;
}
