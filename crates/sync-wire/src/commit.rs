use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A resumable paging cursor within a snapshot "as of" a specific
/// `commitSeq` (spec §3). Invariant: a bootstrap uses the same
/// `asOfCommitSeq` until complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapState {
    pub as_of_commit_seq: i64,
    pub tables: Vec<String>,
    pub table_index: usize,
    pub row_cursor: Option<String>,
}

/// One row-level effect inside a commit, as delivered to a client (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDelivery {
    pub table: String,
    pub row_id: String,
    pub op: crate::OperationStatus,
    pub row_json: Option<Value>,
    pub row_version: Option<i64>,
    pub scopes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDelivery {
    pub commit_seq: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub actor_id: String,
    pub changes: Vec<ChangeDelivery>,
}
