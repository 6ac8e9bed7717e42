//! Optional cross-instance fan-out (spec §4.8): lets several server
//! processes behind the same store share commit nudges without every
//! instance re-deriving them from a poll.

use serde::{Deserialize, Serialize};

/// A commit nudge published across instances. `source_instance_id` lets
/// each instance suppress its own echo when the fan-out bus reflects a
/// publish back to the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub source_instance_id: String,
    pub partition: String,
    pub commit_seq: i64,
    pub scope_keys: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("broadcast publish failed: {0}")]
pub struct BroadcastError(pub String);

/// Transport for cross-instance fan-out (e.g. Postgres `LISTEN/NOTIFY`, a
/// Redis channel). `sync-notify` only depends on the trait; wiring a real
/// backend is left to the deployment.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, event: &BroadcastEvent) -> Result<(), BroadcastError>;
}
