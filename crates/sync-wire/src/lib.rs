//! Wire-level DTOs for the sync protocol.
//!
//! These types are bit-exact at the JSON layer (spec §6): the front-end
//! (HTTP/WebSocket route layer, out of scope here) deserializes a request
//! into these types and hands them to `sync-engine`; the core never touches
//! raw JSON bytes beyond what's defined here.

mod commit;
mod error;
mod pull;
mod push;
mod snapshot;

pub use commit::{BootstrapState, ChangeDelivery, CommitDelivery};
pub use error::{ErrorCode, SyncError};
pub use pull::{
    PullRequest, PullResponse, SubscriptionRequest, SubscriptionResponse, SubscriptionStatus,
};
pub use push::{Operation, OperationResult, OperationStatus, PushRequest, PushResponse, PushStatus};
pub use snapshot::{SnapshotChunkRef, SnapshotDelivery};

/// Reserved `clientId` marking synthetic commits produced by out-of-band
/// data changes (spec §3, §4.10). No real client may use this value.
pub const EXTERNAL_CLIENT_ID: &str = "__external__";

/// Default partition identifier used when the front end does not supply one.
pub const DEFAULT_PARTITION: &str = "default";

/// Opaque tenant/isolation boundary. Every commit, change, cursor,
/// subscription, and chunk is keyed by a `PartitionId`.
pub type PartitionId = String;

/// Combined sync request: `push` and/or `pull` in one round trip.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncRequest {
    pub client_id: String,
    #[serde(default)]
    pub push: Option<PushRequest>,
    #[serde(default)]
    pub pull: Option<PullRequest>,
}

/// Combined sync response.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullResponse>,
}

/// Realtime push-channel event. Exact event names are stable; payloads are
/// additive (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RealtimeEvent {
    Sync { data: SyncNudge },
    Heartbeat,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncNudge {
    pub cursor: i64,
}
