use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row-level mutation inside a push (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub table: String,
    pub row_id: String,
    pub op: OperationStatus,
    pub payload: Option<Value>,
    #[serde(default)]
    pub base_version: Option<i64>,
}

/// `op` discriminator on an [`Operation`]. Named `OperationStatus` to match
/// the wire field's sibling `status` on [`OperationResult`]; the value set
/// itself is `upsert` | `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub client_commit_id: String,
    pub schema_version: u32,
    pub operations: Vec<Operation>,
}

/// Per-operation result, tagged by `status` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Applied {
        op_index: usize,
    },
    Conflict {
        op_index: usize,
        message: String,
        server_version: Option<i64>,
        server_row: Option<Value>,
    },
    Error {
        op_index: usize,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        retriable: Option<bool>,
    },
}

impl OperationResult {
    pub fn op_index(&self) -> usize {
        match self {
            OperationResult::Applied { op_index } => *op_index,
            OperationResult::Conflict { op_index, .. } => *op_index,
            OperationResult::Error { op_index, .. } => *op_index,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, OperationResult::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Applied,
    Cached,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: PushStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_seq: Option<i64>,
    pub results: Vec<OperationResult>,
}
