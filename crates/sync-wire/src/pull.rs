use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{BootstrapState, CommitDelivery, SnapshotDelivery};

/// A single scope constraint value: either one string or a set of strings
/// (spec §3 `SubscriptionRequest.scopes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    One(String),
    Many(Vec<String>),
}

impl ScopeValue {
    /// Expand to the set of values this constraint admits.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ScopeValue::One(s) => vec![s.as_str()],
            ScopeValue::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub id: String,
    pub table: String,
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeValue>,
    #[serde(default)]
    pub params: Option<Value>,
    /// `-1` signals initial bootstrap.
    pub cursor: i64,
    #[serde(default)]
    pub bootstrap_state: Option<BootstrapState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub limit_commits: u32,
    #[serde(default)]
    pub limit_snapshot_rows: Option<u32>,
    #[serde(default)]
    pub max_snapshot_pages: Option<u32>,
    #[serde(default)]
    pub dedupe_rows: bool,
    pub subscriptions: Vec<SubscriptionRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub status: SubscriptionStatus,
    pub scopes: BTreeMap<String, String>,
    pub bootstrap: bool,
    #[serde(default)]
    pub bootstrap_state: Option<BootstrapState>,
    pub next_cursor: i64,
    pub commits: Vec<CommitDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<Vec<SnapshotDelivery>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
}
