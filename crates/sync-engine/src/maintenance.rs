//! Maintenance Loops (spec §4.9): prune, compact, snapshot-chunk GC, and
//! audit prune, each single-flighted and debounced per partition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sync_audit::{prune_audit, AuditPruneInput};
use sync_merge::{compute_prune_watermark, PruneWatermarkInput};
use sync_store::blob::BlobStore;
use sync_store::{chunks, commits, cursors, maintenance as store_maintenance, StorePool};
use sync_wire::SyncError;
use tokio_util::sync::CancellationToken;

use crate::store_err;

#[derive(Debug, Clone, Copy, Default)]
struct LoopState {
    last_run_ms: i64,
    in_flight: bool,
}

/// What each maintenance pass removed, for logging/metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceOutcome {
    pub pruned_commits: u64,
    pub compacted_changes: u64,
    pub expired_chunks: u64,
    pub audit_request_events: u64,
    pub audit_operation_events: u64,
}

/// Runs the four maintenance loop kinds, single-flighted (only one run of
/// a given kind per partition at a time) and debounced by
/// `maintenanceMinIntervalMs` — a second caller inside the debounce window
/// is a silent no-op rather than an error, so `maybe_run` is safe to call
/// opportunistically from the end of every pull.
pub struct MaintenanceRunner {
    pool: StorePool,
    settings: sync_config::SyncSettings,
    states: Mutex<HashMap<(&'static str, String), LoopState>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    cancel: CancellationToken,
}

const KIND_PRUNE: &str = "prune";
const KIND_COMPACT: &str = "compact";
const KIND_SNAPSHOT_GC: &str = "snapshot_gc";
const KIND_AUDIT_PRUNE: &str = "audit_prune";

impl MaintenanceRunner {
    pub fn new(pool: StorePool, settings: sync_config::SyncSettings) -> Self {
        Self {
            pool,
            settings,
            states: Mutex::new(HashMap::new()),
            blob_store: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Give the snapshot-GC loop a blob store so expired chunks' offloaded
    /// bytes are actually reclaimed, not just their `sync_snapshot_chunks`
    /// row.
    pub fn with_blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blob_store);
        self
    }

    /// Share a cancellation token so a caller shutting down can stop the
    /// runner partway between loop kinds instead of waiting for all four to
    /// finish.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Try to claim `kind` for `partition`. Returns `false` (without
    /// claiming) if another run is in flight or the debounce window hasn't
    /// elapsed.
    fn try_claim(&self, kind: &'static str, partition: &str, now_ms: i64) -> bool {
        let mut states = self.states.lock().unwrap();
        let key = (kind, partition.to_string());
        let state = states.entry(key).or_default();
        if state.in_flight {
            return false;
        }
        let min_interval = self.settings.maintenance_min_interval_ms as i64;
        if now_ms - state.last_run_ms < min_interval {
            return false;
        }
        state.in_flight = true;
        state.last_run_ms = now_ms;
        true
    }

    fn release(&self, kind: &'static str, partition: &str) {
        let mut states = self.states.lock().unwrap();
        if let Some(state) = states.get_mut(&(kind, partition.to_string())) {
            state.in_flight = false;
        }
    }

    /// Run whichever loops are due for `partition`, skipping any still
    /// debounced or in flight. Safe to call from any request path.
    pub async fn maybe_run(
        &self,
        partition: &str,
        now_ms: i64,
    ) -> Result<MaintenanceOutcome, SyncError> {
        let mut outcome = MaintenanceOutcome::default();

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if self.try_claim(KIND_PRUNE, partition, now_ms) {
            let result = self.run_prune(partition, now_ms).await;
            self.release(KIND_PRUNE, partition);
            outcome.pruned_commits = result?;
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if self.try_claim(KIND_COMPACT, partition, now_ms) {
            let result = self.run_compact(partition, now_ms).await;
            self.release(KIND_COMPACT, partition);
            outcome.compacted_changes = result?;
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if self.try_claim(KIND_SNAPSHOT_GC, partition, now_ms) {
            let result = self.run_snapshot_gc(now_ms).await;
            self.release(KIND_SNAPSHOT_GC, partition);
            outcome.expired_chunks = result?;
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if self.try_claim(KIND_AUDIT_PRUNE, partition, now_ms) {
            let result = self.run_audit_prune(now_ms).await;
            self.release(KIND_AUDIT_PRUNE, partition);
            let (req, ops) = result?;
            outcome.audit_request_events = req;
            outcome.audit_operation_events = ops;
        }

        Ok(outcome)
    }

    async fn run_prune(&self, partition: &str, now_ms: i64) -> Result<u64, SyncError> {
        let oldest_active_cursor = cursors::oldest_active_cursor(&self.pool, partition)
            .await
            .map_err(store_err)?;
        let latest_commit_seq = commits::latest_commit_seq(&self.pool, partition)
            .await
            .map_err(store_err)?;

        let watermark = compute_prune_watermark(PruneWatermarkInput {
            oldest_active_cursor,
            now_ms,
            active_window_ms: self.settings.retention.active_window_ms,
            keep_newest_commits: self.settings.retention.keep_newest_commits,
            latest_commit_seq,
            fallback_max_age_ms: self.settings.retention.fallback_max_age_ms,
        });
        if watermark <= 0 {
            return Ok(0);
        }

        store_maintenance::prune_commits(&self.pool, partition, watermark)
            .await
            .map_err(store_err)
    }

    async fn run_compact(&self, partition: &str, now_ms: i64) -> Result<u64, SyncError> {
        let before_ms = now_ms - self.settings.retention.full_history_hours * 60 * 60 * 1000;
        store_maintenance::compact(&self.pool, partition, before_ms)
            .await
            .map_err(store_err)
    }

    async fn run_snapshot_gc(&self, now_ms: i64) -> Result<u64, SyncError> {
        chunks::cleanup_expired(&self.pool, now_ms, self.blob_store.as_deref())
            .await
            .map_err(store_err)
    }

    async fn run_audit_prune(&self, now_ms: i64) -> Result<(u64, u64), SyncError> {
        let outcome = prune_audit(
            &self.pool,
            AuditPruneInput {
                max_age_ms: self.settings.retention.audit_max_age_ms,
                max_rows: self.settings.retention.audit_max_rows,
                now_ms,
            },
        )
        .await
        .map_err(store_err)?;
        Ok((
            outcome.request_events_deleted,
            outcome.operation_events_deleted,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> StorePool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store_pool = StorePool::Sqlite(pool);
        sync_store::ensure_schema(&store_pool).await.unwrap();
        sync_audit::ensure_schema(&store_pool).await.unwrap();
        store_pool
    }

    #[tokio::test]
    async fn a_second_call_inside_the_debounce_window_runs_nothing() {
        let pool = test_pool().await;
        let runner = MaintenanceRunner::new(pool, sync_config::SyncSettings::default());

        let first = runner.maybe_run("default", 1_000_000).await.unwrap();
        // Empty log: nothing to prune/compact/gc, but the claim still fires.
        assert_eq!(first.pruned_commits, 0);

        let second = runner.maybe_run("default", 1_000_050).await;
        assert!(second.is_ok());
        let second = second.unwrap();
        assert_eq!(second.pruned_commits, 0);
        assert_eq!(second.audit_request_events, 0);
    }

    #[tokio::test]
    async fn a_cancelled_token_stops_the_runner_before_any_loop_kind() {
        let pool = test_pool().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = MaintenanceRunner::new(pool, sync_config::SyncSettings::default())
            .with_cancellation_token(cancel);

        let err = runner.maybe_run("default", 1_000_000).await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }

    #[tokio::test]
    async fn separate_partitions_debounce_independently() {
        let pool = test_pool().await;
        let runner = MaintenanceRunner::new(pool, sync_config::SyncSettings::default());

        assert!(runner.try_claim(KIND_PRUNE, "tenant-a", 1_000_000));
        assert!(!runner.try_claim(KIND_PRUNE, "tenant-a", 1_000_001));
        assert!(runner.try_claim(KIND_PRUNE, "tenant-b", 1_000_001));
    }
}
