//! Push Pipeline (spec §4.5): validates, dispatches each operation to its
//! table's handler, appends one commit for the whole batch, and notifies.

use std::sync::Arc;

use sync_audit::AuditWriter;
use sync_handlers::{ApplyContext, ApplyOutcome, ApplyResult, HandlerError, HandlerRegistry};
use sync_notify::Notifier;
use sync_store::commits::{self, AppendCommitInput, NewChange};
use sync_store::StorePool;
use sync_wire::{
    ErrorCode, Operation, OperationResult, PushRequest, PushResponse, PushStatus, SyncError,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::store_err;

/// Runs the push pipeline against one partition. Holds no per-request
/// state — safe to share behind an `Arc` across concurrent pushes.
pub struct PushPipeline {
    pool: StorePool,
    handlers: Arc<HandlerRegistry<()>>,
    settings: sync_config::SyncSettings,
    notifier: Option<Arc<Notifier>>,
    audit: Option<AsyncMutex<AuditWriter>>,
    cancel: CancellationToken,
}

impl PushPipeline {
    pub fn new(
        pool: StorePool,
        handlers: Arc<HandlerRegistry<()>>,
        settings: sync_config::SyncSettings,
    ) -> Self {
        Self {
            pool,
            handlers,
            settings,
            notifier: None,
            audit: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Record every push request and its per-operation outcomes to the
    /// audit log. Writes are best-effort: a failure here is logged and
    /// never fails the push itself.
    pub fn with_audit_writer(mut self, writer: AuditWriter) -> Self {
        self.audit = Some(AsyncMutex::new(writer));
        self
    }

    /// Share a cancellation token with the caller so an in-flight push can
    /// be aborted between operations (e.g. on client disconnect). A fresh
    /// pipeline's token is never cancelled unless this is called.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn record_audit(
        &self,
        partition: &str,
        client_id: &str,
        actor_id: &str,
        status: &str,
        operations: &[Operation],
        results: &[OperationResult],
    ) {
        let Some(audit) = &self.audit else { return };
        let mut writer = audit.lock().await;
        let request_event_id = match writer
            .record_request(&self.pool, partition, client_id, Some(actor_id), "push", status, None)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "failed to record push audit request event");
                return;
            }
        };
        for result in results {
            let op_index = result.op_index();
            let Some(operation) = operations.get(op_index) else {
                continue;
            };
            let result_status = match result {
                OperationResult::Applied { .. } => "applied",
                OperationResult::Conflict { .. } => "conflict",
                OperationResult::Error { .. } => "error",
            };
            if let Err(e) = writer
                .record_operation(
                    &self.pool,
                    request_event_id,
                    op_index,
                    &operation.table,
                    &operation.row_id,
                    result_status,
                )
                .await
            {
                tracing::warn!(error = %e, "failed to record push audit operation event");
            }
        }
    }

    pub async fn run(
        &self,
        partition: &str,
        actor_id: &str,
        client_id: &str,
        request: PushRequest,
    ) -> Result<PushResponse, SyncError> {
        self.settings
            .validate_schema_version(request.schema_version)?;
        if request.operations.is_empty() {
            return Err(SyncError::InvalidRequest(
                "push requires at least one operation".to_string(),
            ));
        }

        // Step 2: idempotency short-circuit, before any handler runs, so a
        // replayed request never re-applies side effects.
        if let Some(existing_seq) = commits::existing_commit_seq(
            &self.pool,
            partition,
            client_id,
            &request.client_commit_id,
        )
        .await
        .map_err(store_err)?
        {
            let results = replay_results(&self.pool, partition, existing_seq, &request.operations)
                .await?;
            self.record_audit(partition, client_id, actor_id, "cached", &request.operations, &results)
                .await;
            return Ok(PushResponse {
                status: PushStatus::Cached,
                commit_seq: Some(existing_seq),
                results,
            });
        }

        let ctx = ApplyContext {
            actor_id: actor_id.to_string(),
            partition: partition.to_string(),
        };

        let mut results = Vec::with_capacity(request.operations.len());
        let mut emitted = Vec::new();
        let mut rejected = false;

        for (op_index, operation) in request.operations.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(handler) = self.handlers.get(&operation.table) else {
                results.push(OperationResult::Error {
                    op_index,
                    error: format!("no handler registered for table {:?}", operation.table),
                    code: Some(ErrorCode::UnknownTable.to_string()),
                    retriable: Some(false),
                });
                rejected = true;
                continue;
            };

            match handler.apply_operation(&mut (), &ctx, operation, op_index).await {
                Ok(ApplyOutcome {
                    result,
                    emitted_changes,
                }) => {
                    match result {
                        ApplyResult::Applied => results.push(OperationResult::Applied { op_index }),
                        ApplyResult::Conflict {
                            server_version,
                            server_row,
                            message,
                        } => results.push(OperationResult::Conflict {
                            op_index,
                            message,
                            server_version,
                            server_row,
                        }),
                        ApplyResult::Error {
                            code,
                            error,
                            retriable,
                        } => {
                            if !retriable {
                                rejected = true;
                            }
                            results.push(OperationResult::Error {
                                op_index,
                                error,
                                code: Some(code),
                                retriable: Some(retriable),
                            });
                        }
                    }
                    emitted.extend(emitted_changes);
                }
                Err(HandlerError::Storage(message)) => {
                    // Storage errors are retriable by default — the caller
                    // is expected to resubmit with the same clientCommitId.
                    results.push(OperationResult::Error {
                        op_index,
                        error: message,
                        code: Some(ErrorCode::StorageError.to_string()),
                        retriable: Some(true),
                    });
                }
                Err(HandlerError::Constraint(message)) => {
                    rejected = true;
                    results.push(OperationResult::Error {
                        op_index,
                        error: message,
                        code: Some(ErrorCode::ConstraintViolation.to_string()),
                        retriable: Some(false),
                    });
                }
            }
        }

        if rejected {
            self.record_audit(partition, client_id, actor_id, "rejected", &request.operations, &results)
                .await;
            return Ok(PushResponse {
                status: PushStatus::Rejected,
                commit_seq: None,
                results,
            });
        }

        let changes: Vec<NewChange> = emitted
            .iter()
            .map(|c: &sync_handlers::EmittedChange| NewChange {
                table: c.table.clone(),
                row_id: c.row_id.clone(),
                op: c.op,
                row_json: c.row_json.clone(),
                row_version: c.row_version,
                scopes: c.scopes.clone(),
            })
            .collect();

        let result_json = serde_json::to_value(&results)
            .map_err(|e| SyncError::InvalidRequest(format!("result serialize failed: {e}")))?;

        let input = AppendCommitInput {
            partition: partition.to_string(),
            actor_id: actor_id.to_string(),
            client_id: client_id.to_string(),
            client_commit_id: request.client_commit_id.clone(),
            meta: None,
            result: Some(result_json),
            changes,
            affected_tables_override: None,
        };
        let outcome = commits::append_commit(&self.pool, &input, self.settings.max_append_retries)
            .await
            .map_err(store_err)?;

        if outcome.deduped {
            // Another request won the race between our dedup check and the
            // insert. The handlers above already ran — see DESIGN.md for
            // why this is an accepted exposure of the `Tx = ()` handler
            // model — but the response must still reflect the commit that
            // actually made it into the log.
            let results =
                replay_results(&self.pool, partition, outcome.commit_seq, &request.operations)
                    .await?;
            self.record_audit(partition, client_id, actor_id, "cached", &request.operations, &results)
                .await;
            return Ok(PushResponse {
                status: PushStatus::Cached,
                commit_seq: Some(outcome.commit_seq),
                results,
            });
        }

        if let Some(notifier) = &self.notifier {
            let scope_keys = self.affected_scope_keys(partition, &emitted);
            if !scope_keys.is_empty() {
                notifier.notify_commit(
                    partition,
                    outcome.commit_seq,
                    &scope_keys,
                    std::slice::from_ref(&client_id.to_string()),
                );
            }
        }

        self.record_audit(partition, client_id, actor_id, "applied", &request.operations, &results)
            .await;

        Ok(PushResponse {
            status: PushStatus::Applied,
            commit_seq: Some(outcome.commit_seq),
            results,
        })
    }

    fn affected_scope_keys(
        &self,
        partition: &str,
        emitted: &[sync_handlers::EmittedChange],
    ) -> Vec<String> {
        let mut keys = Vec::new();
        for change in emitted {
            let Some(handler) = self.handlers.get(&change.table) else {
                continue;
            };
            for pattern in handler.scope_patterns() {
                if let Ok(key) = sync_scope::canonicalize_scope_key(partition, pattern, &change.scopes) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Reconstruct a cached push's `results[]` from the commit's persisted
/// `resultJson`, falling back to a synthesized all-applied vector when no
/// result was recorded (spec §4.5 step 2's explicit fallback).
async fn replay_results(
    pool: &StorePool,
    partition: &str,
    commit_seq: i64,
    operations: &[Operation],
) -> Result<Vec<OperationResult>, SyncError> {
    let persisted = commits::commit_result_json(pool, partition, commit_seq)
        .await
        .map_err(store_err)?;
    match persisted.and_then(|v| serde_json::from_value(v).ok()) {
        Some(results) => Ok(results),
        None => Ok(synthesize_applied_results(operations)),
    }
}

fn synthesize_applied_results(operations: &[Operation]) -> Vec<OperationResult> {
    (0..operations.len())
        .map(|op_index| OperationResult::Applied { op_index })
        .collect()
}
