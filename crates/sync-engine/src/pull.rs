//! Pull Pipeline (spec §4.7): per-subscription incremental catch-up or
//! bootstrap snapshot, with forced-rebootstrap detection on external writes
//! and pruned cursors.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use sync_audit::AuditWriter;
use sync_handlers::{HandlerRegistry, SnapshotContext};
use sync_store::blob::BlobStore;
use sync_store::commits;
use sync_store::{frame, StorePool};
use sync_wire::{
    BootstrapState, CommitDelivery, PullRequest, PullResponse, ScopeValue, SnapshotDelivery,
    SubscriptionRequest, SubscriptionResponse, SubscriptionStatus, SyncError,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::store_err;

pub struct PullPipeline {
    pool: StorePool,
    handlers: Arc<HandlerRegistry<()>>,
    settings: sync_config::SyncSettings,
    blob_store: Option<Arc<dyn BlobStore>>,
    audit: Option<AsyncMutex<AuditWriter>>,
    cancel: CancellationToken,
}

impl PullPipeline {
    pub fn new(
        pool: StorePool,
        handlers: Arc<HandlerRegistry<()>>,
        settings: sync_config::SyncSettings,
    ) -> Self {
        Self {
            pool,
            handlers,
            settings,
            blob_store: None,
            audit: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blob_store);
        self
    }

    /// Record every pull request and its per-subscription outcome (bootstrap
    /// vs incremental) to the audit log. Writes are best-effort.
    pub fn with_audit_writer(mut self, writer: AuditWriter) -> Self {
        self.audit = Some(AsyncMutex::new(writer));
        self
    }

    /// Share a cancellation token so a long multi-page bootstrap can be
    /// aborted between pages instead of running to completion after the
    /// client has already gone away.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn record_audit(
        &self,
        partition: &str,
        client_id: &str,
        actor_id: &str,
        requested: &[SubscriptionRequest],
        responses: &[SubscriptionResponse],
    ) {
        let Some(audit) = &self.audit else { return };
        let mut writer = audit.lock().await;
        let request_event_id = match writer
            .record_request(&self.pool, partition, client_id, Some(actor_id), "pull", "ok", None)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "failed to record pull audit request event");
                return;
            }
        };
        for (op_index, (sub, response)) in requested.iter().zip(responses.iter()).enumerate() {
            let result_status = if response.bootstrap { "bootstrap" } else { "incremental" };
            if let Err(e) = writer
                .record_operation(&self.pool, request_event_id, op_index, &sub.table, &sub.id, result_status)
                .await
            {
                tracing::warn!(error = %e, "failed to record pull audit operation event");
            }
        }
    }

    pub async fn run(
        &self,
        partition: &str,
        actor_id: &str,
        client_id: &str,
        request: PullRequest,
    ) -> Result<PullResponse, SyncError> {
        let limit_snapshot_rows = request
            .limit_snapshot_rows
            .unwrap_or(self.settings.snapshot_paging.limit_snapshot_rows);
        let mut pages_budget = request
            .max_snapshot_pages
            .unwrap_or(self.settings.snapshot_paging.max_snapshot_pages);

        // Cross-subscription row dedup (spec §4.7 step 6) is keyed on
        // (table, rowId) over the incremental changes this pull delivers;
        // bootstrap snapshot rows have no contract-exposed row id and are
        // not deduped across subscriptions.
        let mut seen_rows: HashSet<(String, String)> = HashSet::new();

        let mut subscriptions = Vec::with_capacity(request.subscriptions.len());
        for sub in &request.subscriptions {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let response = self
                .run_subscription(
                    partition,
                    actor_id,
                    sub,
                    request.limit_commits,
                    limit_snapshot_rows,
                    &mut pages_budget,
                    request.dedupe_rows,
                    &mut seen_rows,
                )
                .await?;

            sync_store::cursors::upsert_cursor(
                &self.pool,
                partition,
                client_id,
                &sub.id,
                response.next_cursor,
            )
            .await
            .map_err(store_err)?;

            subscriptions.push(response);
        }

        self.record_audit(partition, client_id, actor_id, &request.subscriptions, &subscriptions)
            .await;

        Ok(PullResponse { subscriptions })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_subscription(
        &self,
        partition: &str,
        actor_id: &str,
        sub: &SubscriptionRequest,
        limit_commits: u32,
        limit_snapshot_rows: u32,
        pages_budget: &mut u32,
        dedupe_rows: bool,
        seen_rows: &mut HashSet<(String, String)>,
    ) -> Result<SubscriptionResponse, SyncError> {
        let handler = self
            .handlers
            .get(&sub.table)
            .ok_or_else(|| SyncError::UnknownTable(sub.table.clone()))?;

        let effective_scopes = handler.resolve_scopes(actor_id, partition, sub.params.as_ref());
        let scopes_display = first_values(&effective_scopes);

        let latest = commits::latest_commit_seq(&self.pool, partition)
            .await
            .map_err(store_err)?;

        let mut bootstrap_state = sub.bootstrap_state.clone();
        let mut bootstrap = sub.cursor < 0 || bootstrap_state.is_some();

        if !bootstrap {
            let forced_external = !commits::external_commits_touching_table(
                &self.pool,
                partition,
                &sub.table,
                sub.cursor,
            )
            .await
            .map_err(store_err)?
            .is_empty();
            let oldest = commits::oldest_commit_seq(&self.pool, partition)
                .await
                .map_err(store_err)?;
            let pruned_past_cursor = oldest.map(|o| sub.cursor < o).unwrap_or(false);

            if forced_external || pruned_past_cursor {
                bootstrap = true;
                bootstrap_state = Some(BootstrapState {
                    as_of_commit_seq: latest,
                    tables: vec![sub.table.clone()],
                    table_index: 0,
                    row_cursor: None,
                });
            }
        }

        if bootstrap {
            let state = bootstrap_state.unwrap_or_else(|| BootstrapState {
                as_of_commit_seq: latest,
                tables: vec![sub.table.clone()],
                table_index: 0,
                row_cursor: None,
            });
            return self
                .run_bootstrap(
                    partition,
                    handler.as_ref(),
                    &scopes_display,
                    sub,
                    state,
                    limit_snapshot_rows,
                    pages_budget,
                )
                .await;
        }

        self.run_incremental(
            partition,
            &effective_scopes,
            &scopes_display,
            sub,
            limit_commits,
            dedupe_rows,
            seen_rows,
        )
        .await
    }

    async fn run_incremental(
        &self,
        partition: &str,
        effective_scopes: &BTreeMap<String, ScopeValue>,
        scopes_display: &BTreeMap<String, String>,
        sub: &SubscriptionRequest,
        limit_commits: u32,
        dedupe_rows: bool,
        seen_rows: &mut HashSet<(String, String)>,
    ) -> Result<SubscriptionResponse, SyncError> {
        let raw_commits = commits::read_commits(
            &self.pool,
            partition,
            sub.cursor,
            Some(std::slice::from_ref(&sub.table)),
            limit_commits,
        )
        .await
        .map_err(store_err)?;

        let mut next_cursor = sub.cursor;
        let mut delivered = Vec::with_capacity(raw_commits.len());
        for commit in raw_commits {
            let commit_seq = commit.commit_seq;
            next_cursor = next_cursor.max(commit_seq);

            let table = sub.table.clone();
            let changes = commit
                .changes
                .into_iter()
                .filter(|change| {
                    if change.table != table {
                        return false;
                    }
                    if !sync_scope::matches_any(&change.scopes, effective_scopes) {
                        return false;
                    }
                    if dedupe_rows {
                        let key = (change.table.clone(), change.row_id.clone());
                        if !seen_rows.insert(key) {
                            return false;
                        }
                    }
                    true
                })
                .collect();

            delivered.push(CommitDelivery {
                commit_seq,
                created_at: commit.created_at,
                actor_id: commit.actor_id,
                changes,
            });
        }

        Ok(SubscriptionResponse {
            id: sub.id.clone(),
            status: SubscriptionStatus::Active,
            scopes: scopes_display.clone(),
            bootstrap: false,
            bootstrap_state: None,
            next_cursor,
            commits: delivered,
            snapshots: None,
        })
    }

    async fn run_bootstrap(
        &self,
        partition: &str,
        handler: &(dyn sync_handlers::TableHandler<()>),
        scopes_display: &BTreeMap<String, String>,
        sub: &SubscriptionRequest,
        mut state: BootstrapState,
        limit_snapshot_rows: u32,
        pages_budget: &mut u32,
    ) -> Result<SubscriptionResponse, SyncError> {
        let mut deliveries = Vec::new();
        let mut finished = false;

        while state.table_index < state.tables.len() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if *pages_budget == 0 {
                break;
            }
            let table = state.tables[state.table_index].clone();

            let ctx = SnapshotContext {
                partition: partition.to_string(),
                scope_values: scopes_display.clone(),
                as_of_commit_seq: state.as_of_commit_seq,
                cursor: state.row_cursor.clone(),
                limit: limit_snapshot_rows,
            };
            let page = handler
                .snapshot(&ctx)
                .await
                .map_err(|e| SyncError::Storage(e.to_string()))?;
            *pages_budget -= 1;

            let is_first_page = state.row_cursor.is_none();
            let is_last_page = page.next_cursor.is_none();

            let body = frame::encode_chunk(&page.rows)?;
            let page_key = sync_store::chunks::PageKey {
                partition: partition.to_string(),
                scope_key: scope_key_string(scopes_display),
                table: table.clone(),
                as_of_commit_seq: state.as_of_commit_seq,
                row_cursor: state.row_cursor.clone(),
                row_limit: limit_snapshot_rows,
            };
            let chunk_ref = sync_store::chunks::store_chunk(
                &self.pool,
                &page_key,
                &body,
                None,
                self.blob_store.as_deref(),
            )
            .await
            .map_err(store_err)?;

            deliveries.push(SnapshotDelivery {
                table: table.clone(),
                rows: None,
                chunks: Some(vec![chunk_ref]),
                is_first_page,
                is_last_page,
            });

            state.row_cursor = page.next_cursor;
            if state.row_cursor.is_none() {
                state.table_index += 1;
            }
            if state.table_index >= state.tables.len() {
                finished = true;
                break;
            }
        }

        let (bootstrap_state_out, next_cursor) = if finished {
            (None, state.as_of_commit_seq)
        } else {
            (Some(state.clone()), state.as_of_commit_seq)
        };

        Ok(SubscriptionResponse {
            id: sub.id.clone(),
            status: SubscriptionStatus::Active,
            scopes: scopes_display.clone(),
            bootstrap: !finished,
            bootstrap_state: bootstrap_state_out,
            next_cursor,
            commits: vec![],
            snapshots: Some(deliveries),
        })
    }
}

/// Picks the first admitted value per scope variable. `handler.snapshot`
/// requires fully single-valued scopes (spec §4.3); when `resolveScopes`
/// returns a genuinely multi-valued constraint this collapses it to one
/// representative combination rather than Cartesian-expanding bootstrap
/// across every combination — see DESIGN.md.
fn first_values(scopes: &BTreeMap<String, ScopeValue>) -> BTreeMap<String, String> {
    scopes
        .iter()
        .filter_map(|(k, v)| v.values().first().map(|val| (k.clone(), val.to_string())))
        .collect()
}

fn scope_key_string(scope_values: &BTreeMap<String, String>) -> String {
    scope_values
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use sync_scope::Pattern;
    use sync_testkit::InMemoryTableHandler;
    use sync_wire::OperationStatus;

    /// A handler for `table` seeded with `rows`, all resolving to the
    /// single `user_id=u1` scope (every row must carry a matching
    /// `"user_id"` field for `snapshot`'s scope filter to admit it).
    fn handler_for(table: &'static str, rows: Vec<Value>) -> InMemoryTableHandler {
        let handler = InMemoryTableHandler::new(
            table,
            vec![Pattern::parse("user:{user_id}").unwrap()],
            |_actor, _partition, _params| {
                let mut scopes = BTreeMap::new();
                scopes.insert("user_id".to_string(), ScopeValue::One("u1".to_string()));
                scopes
            },
            |row| {
                let mut scopes = BTreeMap::new();
                if let Some(user_id) = row.get("user_id").and_then(|v| v.as_str()) {
                    scopes.insert("user_id".to_string(), user_id.to_string());
                }
                scopes
            },
        );
        for (i, row) in rows.into_iter().enumerate() {
            handler.seed(format!("t{}", i + 1), row, 1);
        }
        handler
    }

    fn tasks_handler(rows: Vec<Value>) -> InMemoryTableHandler {
        handler_for("tasks", rows)
    }

    async fn test_pool() -> StorePool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store_pool = StorePool::Sqlite(pool);
        sync_store::ensure_schema(&store_pool).await.unwrap();
        sync_audit::ensure_schema(&store_pool).await.unwrap();
        store_pool
    }

    #[tokio::test]
    async fn negative_cursor_triggers_bootstrap_and_returns_a_chunk_ref() {
        let pool = test_pool().await;
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry
            .register(Arc::new(tasks_handler(vec![json!({"id": "t1", "user_id": "u1"})])))
            .unwrap();

        let pipeline = PullPipeline::new(pool, Arc::new(registry), sync_config::SyncSettings::default());
        let request = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![SubscriptionRequest {
                id: "sub-1".to_string(),
                table: "tasks".to_string(),
                scopes: BTreeMap::new(),
                params: None,
                cursor: -1,
                bootstrap_state: None,
            }],
        };

        let response = pipeline.run("default", "actor-1", "client-1", request).await.unwrap();
        let sub = &response.subscriptions[0];
        assert!(!sub.bootstrap, "single-page bootstrap should finish immediately");
        assert!(sub.bootstrap_state.is_none());
        let snapshots = sub.snapshots.as_ref().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].is_last_page);
        assert!(snapshots[0].chunks.is_some());
    }

    #[tokio::test]
    async fn a_bootstrap_pull_writes_a_request_event_and_one_operation_event() {
        let pool = test_pool().await;
        let query_pool = pool.clone();
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry
            .register(Arc::new(tasks_handler(vec![json!({"id": "t1", "user_id": "u1"})])))
            .unwrap();

        let pipeline = PullPipeline::new(pool, Arc::new(registry), sync_config::SyncSettings::default())
            .with_audit_writer(sync_audit::AuditWriter::new("test-namespace"));
        let request = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![SubscriptionRequest {
                id: "sub-1".to_string(),
                table: "tasks".to_string(),
                scopes: BTreeMap::new(),
                params: None,
                cursor: -1,
                bootstrap_state: None,
            }],
        };
        pipeline.run("default", "actor-1", "client-1", request).await.unwrap();

        let StorePool::Sqlite(sqlite_pool) = &query_pool else {
            unreachable!("test pool is always sqlite")
        };
        let (request_events,): (i64,) = sqlx::query_as("select count(*) from sync_request_events")
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        assert_eq!(request_events, 1);
        let (operation_events,): (i64,) = sqlx::query_as(
            "select count(*) from sync_operation_events where result_status = 'bootstrap'",
        )
        .fetch_one(sqlite_pool)
        .await
        .unwrap();
        assert_eq!(operation_events, 1);
    }

    #[tokio::test]
    async fn a_cancelled_token_aborts_before_any_subscription_runs() {
        let pool = test_pool().await;
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry
            .register(Arc::new(tasks_handler(vec![json!({"id": "t1", "user_id": "u1"})])))
            .unwrap();

        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let pipeline = PullPipeline::new(pool, Arc::new(registry), sync_config::SyncSettings::default())
            .with_cancellation_token(cancel);
        let request = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![SubscriptionRequest {
                id: "sub-1".to_string(),
                table: "tasks".to_string(),
                scopes: BTreeMap::new(),
                params: None,
                cursor: -1,
                bootstrap_state: None,
            }],
        };

        let err = pipeline
            .run("default", "actor-1", "client-1", request)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }

    #[tokio::test]
    async fn incremental_pull_only_returns_commits_past_the_cursor() {
        let pool = test_pool().await;
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry.register(Arc::new(tasks_handler(vec![]))).unwrap();

        let mut scopes = BTreeMap::new();
        scopes.insert("user_id".to_string(), "u1".to_string());
        let input = sync_store::commits::AppendCommitInput {
            partition: "default".to_string(),
            actor_id: "actor-1".to_string(),
            client_id: "writer".to_string(),
            client_commit_id: "cc-1".to_string(),
            meta: None,
            result: None,
            changes: vec![sync_store::commits::NewChange {
                table: "tasks".to_string(),
                row_id: "t1".to_string(),
                op: OperationStatus::Upsert,
                row_json: Some(json!({"id": "t1"})),
                row_version: Some(1),
                scopes,
            }],
            affected_tables_override: None,
        };
        let outcome = sync_store::commits::append_commit(&pool, &input, 3).await.unwrap();

        let pipeline = PullPipeline::new(pool, Arc::new(registry), sync_config::SyncSettings::default());
        let request = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![SubscriptionRequest {
                id: "sub-1".to_string(),
                table: "tasks".to_string(),
                scopes: BTreeMap::new(),
                params: None,
                cursor: 0,
                bootstrap_state: None,
            }],
        };

        let response = pipeline.run("default", "actor-1", "client-1", request).await.unwrap();
        let sub = &response.subscriptions[0];
        assert!(!sub.bootstrap);
        assert_eq!(sub.commits.len(), 1);
        assert_eq!(sub.commits[0].commit_seq, outcome.commit_seq);
        assert_eq!(sub.next_cursor, outcome.commit_seq);
    }

    fn subscription(id: &str, table: &str, cursor: i64) -> SubscriptionRequest {
        SubscriptionRequest {
            id: id.to_string(),
            table: table.to_string(),
            scopes: BTreeMap::new(),
            params: None,
            cursor,
            bootstrap_state: None,
        }
    }

    #[tokio::test]
    async fn external_data_change_forces_rebootstrap_only_for_the_touched_table() {
        let pool = test_pool().await;
        let settings = sync_config::SyncSettings::default();
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry
            .register(Arc::new(handler_for("codes", vec![json!({"id": "c1", "user_id": "u1"})])))
            .unwrap();
        registry
            .register(Arc::new(handler_for("tasks", vec![json!({"id": "t1", "user_id": "u1"})])))
            .unwrap();
        let handlers = Arc::new(registry);

        let bootstrap = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![subscription("codes-sub", "codes", -1), subscription("tasks-sub", "tasks", -1)],
        };
        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let first = pipeline.run("default", "actor-1", "client-1", bootstrap).await.unwrap();
        let codes_cursor = first
            .subscriptions
            .iter()
            .find(|s| s.id == "codes-sub")
            .unwrap()
            .next_cursor;
        let tasks_cursor = first
            .subscriptions
            .iter()
            .find(|s| s.id == "tasks-sub")
            .unwrap()
            .next_cursor;
        assert!(first.subscriptions.iter().all(|s| s.bootstrap));

        // Caught up: re-pulling at the bootstrap cursor is a plain incremental no-op.
        let caught_up = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![
                subscription("codes-sub", "codes", codes_cursor),
                subscription("tasks-sub", "tasks", tasks_cursor),
            ],
        };
        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let second = pipeline.run("default", "actor-1", "client-1", caught_up).await.unwrap();
        assert!(second.subscriptions.iter().all(|s| !s.bootstrap));
        assert!(second.subscriptions.iter().all(|s| s.commits.is_empty()));

        crate::notify_external_data_change(&pool, &settings, "default", None, vec!["codes".to_string()])
            .await
            .unwrap();

        let after_change = PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![
                subscription("codes-sub", "codes", codes_cursor),
                subscription("tasks-sub", "tasks", tasks_cursor),
            ],
        };
        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let third = pipeline.run("default", "actor-1", "client-1", after_change).await.unwrap();
        let codes_sub = third.subscriptions.iter().find(|s| s.id == "codes-sub").unwrap();
        let tasks_sub = third.subscriptions.iter().find(|s| s.id == "tasks-sub").unwrap();
        assert!(codes_sub.bootstrap, "touched table must force a fresh bootstrap");
        assert!(!codes_sub.snapshots.as_ref().unwrap().is_empty());
        assert!(!tasks_sub.bootstrap, "untouched table must stay incremental");
    }

    #[tokio::test]
    async fn repeated_snapshot_chunk_requests_for_the_same_page_key_share_one_content_address() {
        let pool = test_pool().await;
        let settings = sync_config::SyncSettings::default();
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry
            .register(Arc::new(handler_for(
                "tasks",
                vec![json!({"id": "t1", "user_id": "u1"}), json!({"id": "t2", "user_id": "u1"})],
            )))
            .unwrap();
        let handlers = Arc::new(registry);

        let request = || PullRequest {
            limit_commits: 100,
            limit_snapshot_rows: None,
            max_snapshot_pages: None,
            dedupe_rows: false,
            subscriptions: vec![subscription("sub-1", "tasks", -1)],
        };

        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let first = pipeline.run("default", "actor-1", "client-1", request()).await.unwrap();
        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let second = pipeline.run("default", "actor-2", "client-2", request()).await.unwrap();

        let first_chunk = &first.subscriptions[0].snapshots.as_ref().unwrap()[0].chunks.as_ref().unwrap()[0];
        let second_chunk = &second.subscriptions[0].snapshots.as_ref().unwrap()[0].chunks.as_ref().unwrap()[0];
        assert_eq!(first_chunk.id, second_chunk.id);
        assert_eq!(first_chunk.sha256, second_chunk.sha256);

        let StorePool::Sqlite(sqlite_pool) = &pool else {
            unreachable!("test pool is always sqlite")
        };
        let (chunk_rows,): (i64,) = sqlx::query_as("select count(*) from sync_snapshot_chunks")
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        assert_eq!(chunk_rows, 1);
    }

    #[tokio::test]
    async fn pruning_past_a_slow_cursor_forces_its_rebootstrap_but_leaves_a_fast_cursor_incremental() {
        let pool = test_pool().await;
        let settings = sync_config::SyncSettings::default();
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry
            .register(Arc::new(handler_for("tasks", vec![json!({"id": "seed", "user_id": "u1"})])))
            .unwrap();
        let handlers = Arc::new(registry);

        let mut scopes = BTreeMap::new();
        scopes.insert("user_id".to_string(), "u1".to_string());
        let mut last_seq = 0;
        let mut slow_cursor = 0;
        for i in 0..20 {
            let input = sync_store::commits::AppendCommitInput {
                partition: "default".to_string(),
                actor_id: "actor-1".to_string(),
                client_id: "writer".to_string(),
                client_commit_id: format!("cc-{i}"),
                meta: None,
                result: None,
                changes: vec![sync_store::commits::NewChange {
                    table: "tasks".to_string(),
                    row_id: format!("t{i}"),
                    op: OperationStatus::Upsert,
                    row_json: Some(json!({"id": format!("t{i}")})),
                    row_version: Some(1),
                    scopes: scopes.clone(),
                }],
                affected_tables_override: None,
            };
            let outcome = sync_store::commits::append_commit(&pool, &input, 3).await.unwrap();
            last_seq = outcome.commit_seq;
            if i == 2 {
                slow_cursor = outcome.commit_seq;
            }
        }
        let fast_cursor = last_seq;

        sync_store::maintenance::prune_commits(&pool, "default", fast_cursor - 1)
            .await
            .unwrap();

        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let slow = pipeline
            .run(
                "default",
                "actor-1",
                "client-1",
                PullRequest {
                    limit_commits: 100,
                    limit_snapshot_rows: None,
                    max_snapshot_pages: None,
                    dedupe_rows: false,
                    subscriptions: vec![subscription("slow-sub", "tasks", slow_cursor)],
                },
            )
            .await
            .unwrap();
        assert!(slow.subscriptions[0].bootstrap, "pruned-past cursor must force rebootstrap");

        let pipeline = PullPipeline::new(pool.clone(), handlers.clone(), settings.clone());
        let fast = pipeline
            .run(
                "default",
                "actor-1",
                "client-1",
                PullRequest {
                    limit_commits: 100,
                    limit_snapshot_rows: None,
                    max_snapshot_pages: None,
                    dedupe_rows: false,
                    subscriptions: vec![subscription("fast-sub", "tasks", fast_cursor)],
                },
            )
            .await
            .unwrap();
        assert!(!fast.subscriptions[0].bootstrap, "a cursor past the watermark stays incremental");
    }
}
