//! `InMemoryTableHandler`: a `TableHandler<()>` backed by a `Mutex`-guarded
//! `BTreeMap` instead of a real table, for exercising the push/pull
//! pipelines without a database.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use sync_handlers::{
    ApplyContext, ApplyOutcome, ApplyResult, EmittedChange, HandlerError, SnapshotContext,
    SnapshotPage, TableHandler,
};
use sync_scope::Pattern;
use sync_wire::{Operation, OperationStatus, ScopeValue};

/// One row as the in-memory handler keeps it: current JSON body, version
/// counter (incremented on every upsert, spec §4.3 optimistic concurrency),
/// and its extracted scope values.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub row_json: Value,
    pub row_version: i64,
    pub scopes: BTreeMap<String, String>,
}

type ResolveScopesFn = dyn Fn(&str, &str, Option<&Value>) -> BTreeMap<String, ScopeValue> + Send + Sync;
type ExtractScopesFn = dyn Fn(&Value) -> BTreeMap<String, String> + Send + Sync;

/// A fully in-memory `TableHandler`. Construct with [`InMemoryTableHandler::new`],
/// supplying closures for the two caller-specific hooks the contract
/// requires (`resolveScopes`, `extractScopes`); storage, versioning, and
/// conflict detection are handled generically.
pub struct InMemoryTableHandler {
    table: &'static str,
    patterns: Vec<Pattern>,
    resolve_scopes_fn: Box<ResolveScopesFn>,
    extract_scopes_fn: Box<ExtractScopesFn>,
    rows: Mutex<BTreeMap<String, StoredRow>>,
}

impl InMemoryTableHandler {
    pub fn new(
        table: &'static str,
        patterns: Vec<Pattern>,
        resolve_scopes_fn: impl Fn(&str, &str, Option<&Value>) -> BTreeMap<String, ScopeValue>
            + Send
            + Sync
            + 'static,
        extract_scopes_fn: impl Fn(&Value) -> BTreeMap<String, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            table,
            patterns,
            resolve_scopes_fn: Box::new(resolve_scopes_fn),
            extract_scopes_fn: Box::new(extract_scopes_fn),
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seed a row directly, bypassing `apply_operation` — useful for
    /// populating bootstrap fixtures before a pull.
    pub fn seed(&self, row_id: impl Into<String>, row_json: Value, row_version: i64) {
        let scopes = (self.extract_scopes_fn)(&row_json);
        self.rows.lock().unwrap().insert(
            row_id.into(),
            StoredRow {
                row_json,
                row_version,
                scopes,
            },
        );
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl TableHandler<()> for InMemoryTableHandler {
    fn table(&self) -> &str {
        self.table
    }

    fn scope_patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    fn resolve_scopes(
        &self,
        actor_id: &str,
        partition: &str,
        params: Option<&Value>,
    ) -> BTreeMap<String, ScopeValue> {
        (self.resolve_scopes_fn)(actor_id, partition, params)
    }

    fn extract_scopes(&self, row: &Value) -> BTreeMap<String, String> {
        (self.extract_scopes_fn)(row)
    }

    async fn snapshot(&self, ctx: &SnapshotContext) -> Result<SnapshotPage, HandlerError> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<(&String, &StoredRow)> = rows
            .iter()
            .filter(|(_, row)| scopes_satisfy(&row.scopes, &ctx.scope_values))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));

        let start = match &ctx.cursor {
            Some(after) => matching.partition_point(|(row_id, _)| row_id.as_str() <= after.as_str()),
            None => 0,
        };
        let limit = ctx.limit as usize;
        let page: Vec<&(&String, &StoredRow)> = matching[start..].iter().take(limit).collect();

        let next_cursor = if start + page.len() < matching.len() {
            page.last().map(|(row_id, _)| (*row_id).clone())
        } else {
            None
        };

        Ok(SnapshotPage {
            rows: page.iter().map(|(_, row)| row.row_json.clone()).collect(),
            next_cursor,
        })
    }

    async fn apply_operation(
        &self,
        _tx: &mut (),
        _ctx: &ApplyContext,
        operation: &Operation,
        op_index: usize,
    ) -> Result<ApplyOutcome, HandlerError> {
        let mut rows = self.rows.lock().unwrap();

        match operation.op {
            OperationStatus::Delete => {
                if let Some(existing) = rows.get(&operation.row_id) {
                    if let Some(base) = operation.base_version {
                        if base != existing.row_version {
                            return Ok(ApplyOutcome {
                                result: ApplyResult::Conflict {
                                    server_version: Some(existing.row_version),
                                    server_row: Some(existing.row_json.clone()),
                                    message: "base_version mismatch on delete".to_string(),
                                },
                                emitted_changes: vec![],
                            });
                        }
                    }
                }
                let scopes = rows
                    .remove(&operation.row_id)
                    .map(|row| row.scopes)
                    .unwrap_or_default();
                Ok(ApplyOutcome {
                    result: ApplyResult::Applied,
                    emitted_changes: vec![EmittedChange {
                        table: self.table.to_string(),
                        row_id: operation.row_id.clone(),
                        op: OperationStatus::Delete,
                        row_json: None,
                        row_version: None,
                        scopes,
                    }],
                })
            }
            OperationStatus::Upsert => {
                let Some(payload) = operation.payload.clone() else {
                    return Ok(ApplyOutcome {
                        result: ApplyResult::Error {
                            code: "INVALID_REQUEST".to_string(),
                            error: "upsert requires a payload".to_string(),
                            retriable: false,
                        },
                        emitted_changes: vec![],
                    });
                };

                if let Some(existing) = rows.get(&operation.row_id) {
                    if let Some(base) = operation.base_version {
                        if base != existing.row_version {
                            return Ok(ApplyOutcome {
                                result: ApplyResult::Conflict {
                                    server_version: Some(existing.row_version),
                                    server_row: Some(existing.row_json.clone()),
                                    message: "base_version mismatch on upsert".to_string(),
                                },
                                emitted_changes: vec![],
                            });
                        }
                    }
                }

                let next_version = rows
                    .get(&operation.row_id)
                    .map(|row| row.row_version + 1)
                    .unwrap_or(1);
                let scopes = (self.extract_scopes_fn)(&payload);
                rows.insert(
                    operation.row_id.clone(),
                    StoredRow {
                        row_json: payload.clone(),
                        row_version: next_version,
                        scopes: scopes.clone(),
                    },
                );

                let _ = op_index;
                Ok(ApplyOutcome {
                    result: ApplyResult::Applied,
                    emitted_changes: vec![EmittedChange {
                        table: self.table.to_string(),
                        row_id: operation.row_id.clone(),
                        op: OperationStatus::Upsert,
                        row_json: Some(payload),
                        row_version: Some(next_version),
                        scopes,
                    }],
                })
            }
        }
    }
}

fn scopes_satisfy(stored: &BTreeMap<String, String>, wanted: &BTreeMap<String, String>) -> bool {
    wanted.iter().all(|(k, v)| stored.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler() -> InMemoryTableHandler {
        InMemoryTableHandler::new(
            "tasks",
            vec![Pattern::parse("user:{user_id}").unwrap()],
            |_actor, _partition, _params| BTreeMap::new(),
            |row| {
                let mut scopes = BTreeMap::new();
                if let Some(user_id) = row.get("user_id").and_then(|v| v.as_str()) {
                    scopes.insert("user_id".to_string(), user_id.to_string());
                }
                scopes
            },
        )
    }

    #[tokio::test]
    async fn upsert_then_conflicting_base_version_is_rejected() {
        let h = handler();
        let ctx = ApplyContext {
            actor_id: "a1".to_string(),
            partition: "default".to_string(),
        };

        let op = Operation {
            table: "tasks".to_string(),
            row_id: "t1".to_string(),
            op: OperationStatus::Upsert,
            payload: Some(json!({"user_id": "u1", "title": "a"})),
            base_version: None,
        };
        let outcome = h.apply_operation(&mut (), &ctx, &op, 0).await.unwrap();
        assert!(matches!(outcome.result, ApplyResult::Applied));

        let stale_op = Operation {
            base_version: Some(999),
            payload: Some(json!({"user_id": "u1", "title": "b"})),
            ..op
        };
        let outcome = h.apply_operation(&mut (), &ctx, &stale_op, 0).await.unwrap();
        assert!(matches!(outcome.result, ApplyResult::Conflict { .. }));
    }

    #[tokio::test]
    async fn snapshot_pages_rows_in_row_id_order() {
        let h = handler();
        h.seed("t1", json!({"user_id": "u1"}), 1);
        h.seed("t2", json!({"user_id": "u1"}), 1);
        h.seed("t3", json!({"user_id": "u1"}), 1);

        let ctx = SnapshotContext {
            partition: "default".to_string(),
            scope_values: BTreeMap::new(),
            as_of_commit_seq: 1,
            cursor: None,
            limit: 2,
        };
        let page = h.snapshot(&ctx).await.unwrap();
        assert_eq!(page.rows.len(), 2);
        assert!(page.next_cursor.is_some());

        let ctx2 = SnapshotContext {
            cursor: page.next_cursor,
            ..ctx
        };
        let page2 = h.snapshot(&ctx2).await.unwrap();
        assert_eq!(page2.rows.len(), 1);
        assert!(page2.next_cursor.is_none());
    }
}
