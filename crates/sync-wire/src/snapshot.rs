use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a content-addressed, compressed bootstrap page (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotChunkRef {
    pub id: String,
    pub byte_length: u64,
    pub sha256: String,
    pub encoding: String,
    pub compression: String,
}

/// One page of a bootstrap response. Rows are inline unless chunk storage
/// is configured, in which case `chunks` carries the reference instead
/// (spec §4.7 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDelivery {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<SnapshotChunkRef>>,
    pub is_first_page: bool,
    pub is_last_page: bool,
}
