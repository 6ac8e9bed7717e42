//! sync-engine
//!
//! The sync core: push pipeline (§4.5), pull pipeline (§4.7), maintenance
//! loops (§4.9), and the external-data notification hook (§4.10). Every
//! other crate in this workspace is a building block `sync-engine` wires
//! together into the two request paths a front end actually calls.

mod external;
mod maintenance;
mod pull;
mod push;

pub use external::{notify_external_data_change, ExternalHookOutcome};
pub use maintenance::{MaintenanceOutcome, MaintenanceRunner};
pub use pull::PullPipeline;
pub use push::PushPipeline;

/// Flattens a store-layer failure into the one infrastructural error type
/// the front end understands (spec §7: storage errors never leak their
/// backend-specific shape past this boundary). Delegates to
/// `sync_store::StoreError`'s own `From` impl so a chunk-layer
/// `SnapshotRowTooLarge`/`SnapshotFormatError` keeps its specific error
/// code instead of collapsing into a generic storage error.
pub(crate) fn store_err(e: sync_store::StoreError) -> sync_wire::SyncError {
    sync_wire::SyncError::from(e)
}
