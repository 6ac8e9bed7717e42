//! Commit Log Store: the authoritative append-only log.
//!
//! `append_commit` runs inside one transaction, one helper per operation,
//! `anyhow::Context` on every fallible step. It retries on a detected
//! serialization conflict with jittered exponential backoff rather than
//! surfacing it to the caller — concurrent pushes into the same partition
//! are expected and must not fail the caller just because two transactions
//! overlapped.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;

use sync_wire::{ChangeDelivery, CommitDelivery, OperationStatus};

use crate::dialect::StorePool;
use crate::error::{is_serialization_failure, StoreError};

#[derive(Debug, Clone)]
pub struct NewChange {
    pub table: String,
    pub row_id: String,
    pub op: OperationStatus,
    pub row_json: Option<Value>,
    pub row_version: Option<i64>,
    pub scopes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AppendCommitInput {
    pub partition: String,
    pub actor_id: String,
    pub client_id: String,
    pub client_commit_id: String,
    pub meta: Option<Value>,
    pub result: Option<Value>,
    pub changes: Vec<NewChange>,
    /// Overrides the affected-tables set derived from `changes`. Used by
    /// the external-data notification hook (spec §4.10), whose synthetic
    /// commit has no changes but must still record `TableCommit` rows for
    /// every table named in the hook's input.
    pub affected_tables_override: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendCommitOutcome {
    pub commit_seq: i64,
    pub deduped: bool,
}

fn op_str(op: OperationStatus) -> &'static str {
    match op {
        OperationStatus::Upsert => "upsert",
        OperationStatus::Delete => "delete",
    }
}

fn parse_op(s: &str) -> OperationStatus {
    match s {
        "delete" => OperationStatus::Delete,
        _ => OperationStatus::Upsert,
    }
}

/// Append one commit, retrying on a detected serialization conflict.
///
/// Default retry budget: a handful of attempts with jittered exponential
/// delay rather than an unbounded retry loop.
pub async fn append_commit(
    pool: &StorePool,
    input: &AppendCommitInput,
    max_retries: u32,
) -> Result<AppendCommitOutcome, StoreError> {
    if let Some(existing) = find_existing_commit(
        pool,
        &input.partition,
        &input.client_id,
        &input.client_commit_id,
    )
    .await?
    {
        return Ok(AppendCommitOutcome {
            commit_seq: existing,
            deduped: true,
        });
    }

    let mut attempt = 0u32;
    loop {
        let result = match pool {
            StorePool::Postgres(p) => append_commit_pg(p, input).await,
            StorePool::Sqlite(p) => append_commit_sqlite(p, input).await,
        };

        match result {
            Ok(outcome) => return Ok(outcome),
            Err(AppendAttemptError::Duplicate) => {
                let existing = find_existing_commit(
                    pool,
                    &input.partition,
                    &input.client_id,
                    &input.client_commit_id,
                )
                .await?
                .ok_or_else(|| {
                    StoreError::Query(
                        "duplicate insert reported but no existing commit found".to_string(),
                    )
                })?;
                return Ok(AppendCommitOutcome {
                    commit_seq: existing,
                    deduped: true,
                });
            }
            Err(AppendAttemptError::Retriable(e)) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(StoreError::RetriesExhausted(max_retries));
                }
                tracing::warn!(attempt, error = %e, "append_commit retrying after serialization conflict");
                let jitter_ms: u32 = rand::thread_rng().gen_range(5..50u32) * attempt;
                tokio::time::sleep(Duration::from_millis(jitter_ms as u64)).await;
            }
            Err(AppendAttemptError::Fatal(e)) => return Err(e),
        }
    }
}

enum AppendAttemptError {
    Duplicate,
    Retriable(sqlx::Error),
    Fatal(StoreError),
}

impl From<sqlx::Error> for AppendAttemptError {
    fn from(e: sqlx::Error) -> Self {
        if is_unique_violation(&e) {
            AppendAttemptError::Duplicate
        } else if is_serialization_failure(&e) || is_sqlite_busy(&e) {
            AppendAttemptError::Retriable(e)
        } else {
            AppendAttemptError::Fatal(StoreError::from(e))
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") || db_err.code().as_deref() == Some("2067"))
}

fn is_sqlite_busy(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("5"))
}

/// Look up a commit already appended for `(partition, client_id,
/// client_commit_id)` without attempting a write. Lets a caller (the push
/// pipeline) skip re-running handler side effects for a request it has
/// already durably applied, before `append_commit`'s own internal dedup
/// check would otherwise short-circuit the insert.
pub async fn existing_commit_seq(
    pool: &StorePool,
    partition: &str,
    client_id: &str,
    client_commit_id: &str,
) -> Result<Option<i64>, StoreError> {
    find_existing_commit(pool, partition, client_id, client_commit_id).await
}

async fn find_existing_commit(
    pool: &StorePool,
    partition: &str,
    client_id: &str,
    client_commit_id: &str,
) -> Result<Option<i64>, StoreError> {
    let sql = "select commit_seq from sync_commits where partition_id = $1 and client_id = $2 and client_commit_id = $3";
    match pool {
        StorePool::Postgres(p) => {
            let row: Option<(i64,)> = sqlx::query_as(sql)
                .bind(partition)
                .bind(client_id)
                .bind(client_commit_id)
                .fetch_optional(p)
                .await?;
            Ok(row.map(|(seq,)| seq))
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            let row: Option<(i64,)> = sqlx::query_as(&sql)
                .bind(partition)
                .bind(client_id)
                .bind(client_commit_id)
                .fetch_optional(p)
                .await?;
            Ok(row.map(|(seq,)| seq))
        }
    }
}

async fn append_commit_pg(
    pool: &sqlx::PgPool,
    input: &AppendCommitInput,
) -> Result<AppendCommitOutcome, AppendAttemptError> {
    let mut tx = pool.begin().await?;
    sqlx::query("set transaction isolation level serializable")
        .execute(&mut *tx)
        .await?;

    let (max_seq,): (Option<i64>,) = sqlx::query_as("select max(commit_seq) from sync_commits")
        .fetch_one(&mut *tx)
        .await?;
    let commit_seq = max_seq.unwrap_or(0) + 1;
    let now_ms = now_millis();

    let affected_tables = input
        .affected_tables_override
        .clone()
        .unwrap_or_else(|| distinct_tables(&input.changes));
    let affected_json = serde_json::to_string(&affected_tables).unwrap();
    let meta_json = input.meta.as_ref().map(|v| v.to_string());
    let result_json = input.result.as_ref().map(|v| v.to_string());

    sqlx::query(
        "insert into sync_commits (commit_seq, partition_id, client_id, client_commit_id, actor_id, created_at_ms, meta_json, result_json, change_count, affected_tables) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(commit_seq)
    .bind(&input.partition)
    .bind(&input.client_id)
    .bind(&input.client_commit_id)
    .bind(&input.actor_id)
    .bind(now_ms)
    .bind(&meta_json)
    .bind(&result_json)
    .bind(input.changes.len() as i32)
    .bind(&affected_json)
    .execute(&mut *tx)
    .await?;

    for change in &input.changes {
        let scopes_json = serde_json::to_string(&change.scopes).unwrap();
        let row_json = change.row_json.as_ref().map(|v| v.to_string());
        sqlx::query(
            "insert into sync_changes (commit_seq, partition_id, table_name, row_id, op, row_json, row_version, scopes_json) values ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(commit_seq)
        .bind(&input.partition)
        .bind(&change.table)
        .bind(&change.row_id)
        .bind(op_str(change.op))
        .bind(&row_json)
        .bind(change.row_version)
        .bind(&scopes_json)
        .execute(&mut *tx)
        .await?;
    }

    for table in &affected_tables {
        sqlx::query(
            "insert into sync_table_commits (commit_seq, partition_id, table_name) values ($1,$2,$3)",
        )
        .bind(commit_seq)
        .bind(&input.partition)
        .bind(table)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(AppendCommitOutcome {
        commit_seq,
        deduped: false,
    })
}

async fn append_commit_sqlite(
    pool: &sqlx::SqlitePool,
    input: &AppendCommitInput,
) -> Result<AppendCommitOutcome, AppendAttemptError> {
    let mut tx = pool.begin().await?;

    let (max_seq,): (Option<i64>,) = sqlx::query_as("select max(commit_seq) from sync_commits")
        .fetch_one(&mut *tx)
        .await?;
    let commit_seq = max_seq.unwrap_or(0) + 1;
    let now_ms = now_millis();

    let affected_tables = input
        .affected_tables_override
        .clone()
        .unwrap_or_else(|| distinct_tables(&input.changes));
    let affected_json = serde_json::to_string(&affected_tables).unwrap();
    let meta_json = input.meta.as_ref().map(|v| v.to_string());
    let result_json = input.result.as_ref().map(|v| v.to_string());

    sqlx::query(
        "insert into sync_commits (commit_seq, partition_id, client_id, client_commit_id, actor_id, created_at_ms, meta_json, result_json, change_count, affected_tables) values (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
    )
    .bind(commit_seq)
    .bind(&input.partition)
    .bind(&input.client_id)
    .bind(&input.client_commit_id)
    .bind(&input.actor_id)
    .bind(now_ms)
    .bind(&meta_json)
    .bind(&result_json)
    .bind(input.changes.len() as i32)
    .bind(&affected_json)
    .execute(&mut *tx)
    .await?;

    for change in &input.changes {
        let scopes_json = serde_json::to_string(&change.scopes).unwrap();
        let row_json = change.row_json.as_ref().map(|v| v.to_string());
        sqlx::query(
            "insert into sync_changes (commit_seq, partition_id, table_name, row_id, op, row_json, row_version, scopes_json) values (?1,?2,?3,?4,?5,?6,?7,?8)",
        )
        .bind(commit_seq)
        .bind(&input.partition)
        .bind(&change.table)
        .bind(&change.row_id)
        .bind(op_str(change.op))
        .bind(&row_json)
        .bind(change.row_version)
        .bind(&scopes_json)
        .execute(&mut *tx)
        .await?;
    }

    for table in &affected_tables {
        sqlx::query(
            "insert into sync_table_commits (commit_seq, partition_id, table_name) values (?1,?2,?3)",
        )
        .bind(commit_seq)
        .bind(&input.partition)
        .bind(table)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(AppendCommitOutcome {
        commit_seq,
        deduped: false,
    })
}

fn distinct_tables(changes: &[NewChange]) -> Vec<String> {
    let mut tables: Vec<String> = changes.iter().map(|c| c.table.clone()).collect();
    tables.sort();
    tables.dedup();
    tables
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Highest assigned `commitSeq` in `partition`, or 0 if the log is empty.
pub async fn latest_commit_seq(pool: &StorePool, partition: &str) -> Result<i64, StoreError> {
    let sql = "select max(commit_seq) from sync_commits where partition_id = $1";
    let max: Option<i64> = match pool {
        StorePool::Postgres(p) => {
            let (v,): (Option<i64>,) = sqlx::query_as(sql).bind(partition).fetch_one(p).await?;
            v
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            let (v,): (Option<i64>,) =
                sqlx::query_as(&sql).bind(partition).fetch_one(p).await?;
            v
        }
    };
    Ok(max.unwrap_or(0))
}

/// Read commits strictly above `cursor_exclusive`, ascending, optionally
/// filtered to commits touching at least one table in `table_filter`.
pub async fn read_commits(
    pool: &StorePool,
    partition: &str,
    cursor_exclusive: i64,
    table_filter: Option<&[String]>,
    limit: u32,
) -> Result<Vec<CommitDelivery>, StoreError> {
    let commit_seqs = match table_filter {
        Some(tables) if !tables.is_empty() => {
            matching_commit_seqs(pool, partition, cursor_exclusive, tables, limit).await?
        }
        _ => {
            all_commit_seqs(pool, partition, cursor_exclusive, limit).await?
        }
    };

    let mut out = Vec::with_capacity(commit_seqs.len());
    for commit_seq in commit_seqs {
        if let Some(delivery) = load_commit_delivery(pool, partition, commit_seq).await? {
            out.push(delivery);
        }
    }
    Ok(out)
}

async fn all_commit_seqs(
    pool: &StorePool,
    partition: &str,
    cursor_exclusive: i64,
    limit: u32,
) -> Result<Vec<i64>, StoreError> {
    let sql = "select commit_seq from sync_commits where partition_id = $1 and commit_seq > $2 order by commit_seq asc limit $3";
    let rows: Vec<(i64,)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(sql)
                .bind(partition)
                .bind(cursor_exclusive)
                .bind(limit as i64)
                .fetch_all(p)
                .await?
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            sqlx::query_as(&sql)
                .bind(partition)
                .bind(cursor_exclusive)
                .bind(limit as i64)
                .fetch_all(p)
                .await?
        }
    };
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

async fn matching_commit_seqs(
    pool: &StorePool,
    partition: &str,
    cursor_exclusive: i64,
    tables: &[String],
    limit: u32,
) -> Result<Vec<i64>, StoreError> {
    // sync_table_commits holds one row per (commit, table); dedupe across tables.
    let mut seqs = std::collections::BTreeSet::new();
    for table in tables {
        let sql = "select commit_seq from sync_table_commits where partition_id = $1 and table_name = $2 and commit_seq > $3 order by commit_seq asc limit $4";
        let rows: Vec<(i64,)> = match pool {
            StorePool::Postgres(p) => {
                sqlx::query_as(sql)
                    .bind(partition)
                    .bind(table)
                    .bind(cursor_exclusive)
                    .bind(limit as i64)
                    .fetch_all(p)
                    .await?
            }
            StorePool::Sqlite(p) => {
                let sql = sql.replace('$', "?");
                sqlx::query_as(&sql)
                    .bind(partition)
                    .bind(table)
                    .bind(cursor_exclusive)
                    .bind(limit as i64)
                    .fetch_all(p)
                    .await?
            }
        };
        seqs.extend(rows.into_iter().map(|(s,)| s));
    }
    let mut seqs: Vec<i64> = seqs.into_iter().collect();
    seqs.truncate(limit as usize);
    Ok(seqs)
}

async fn load_commit_delivery(
    pool: &StorePool,
    partition: &str,
    commit_seq: i64,
) -> Result<Option<CommitDelivery>, StoreError> {
    let commit_sql =
        "select created_at_ms, actor_id from sync_commits where partition_id = $1 and commit_seq = $2";
    let commit_row: Option<(i64, String)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(commit_sql)
                .bind(partition)
                .bind(commit_seq)
                .fetch_optional(p)
                .await?
        }
        StorePool::Sqlite(p) => {
            let sql = commit_sql.replace('$', "?");
            sqlx::query_as(&sql)
                .bind(partition)
                .bind(commit_seq)
                .fetch_optional(p)
                .await?
        }
    };
    let Some((created_at_ms, actor_id)) = commit_row else {
        return Ok(None);
    };

    let changes_sql = "select table_name, row_id, op, row_json, row_version, scopes_json from sync_changes where partition_id = $1 and commit_seq = $2 order by table_name, row_id";
    let rows: Vec<(String, String, String, Option<String>, Option<i64>, String)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(changes_sql)
                .bind(partition)
                .bind(commit_seq)
                .fetch_all(p)
                .await?
        }
        StorePool::Sqlite(p) => {
            let sql = changes_sql.replace('$', "?");
            sqlx::query_as(&sql)
                .bind(partition)
                .bind(commit_seq)
                .fetch_all(p)
                .await?
        }
    };

    let changes = rows
        .into_iter()
        .map(
            |(table, row_id, op, row_json, row_version, scopes_json)| ChangeDelivery {
                table,
                row_id,
                op: parse_op(&op),
                row_json: row_json.map(|s| serde_json::from_str(&s).unwrap_or(Value::Null)),
                row_version,
                scopes: serde_json::from_str(&scopes_json).unwrap_or_default(),
            },
        )
        .collect();

    let created_at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(created_at_ms)
        .unwrap_or_else(chrono::Utc::now);

    Ok(Some(CommitDelivery {
        commit_seq,
        created_at,
        actor_id,
        changes,
    }))
}

/// Lowest `commitSeq` still present in `partition`'s log, or `None` if it
/// is empty. Used to detect a cursor that prune has already passed (spec
/// §4.7 "cursor validity").
pub async fn oldest_commit_seq(pool: &StorePool, partition: &str) -> Result<Option<i64>, StoreError> {
    let sql = "select min(commit_seq) from sync_commits where partition_id = $1";
    let min: Option<i64> = match pool {
        StorePool::Postgres(p) => {
            let (v,): (Option<i64>,) = sqlx::query_as(sql).bind(partition).fetch_one(p).await?;
            v
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            let (v,): (Option<i64>,) =
                sqlx::query_as(&sql).bind(partition).fetch_one(p).await?;
            v
        }
    };
    Ok(min)
}

/// The persisted `resultJson` for a commit, used by the push pipeline's
/// idempotency short-circuit to replay a client's original per-op results
/// (spec §4.5 step 2) instead of re-deriving them.
pub async fn commit_result_json(
    pool: &StorePool,
    partition: &str,
    commit_seq: i64,
) -> Result<Option<Value>, StoreError> {
    let sql = "select result_json from sync_commits where partition_id = $1 and commit_seq = $2";
    let row: Option<(Option<String>,)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(sql)
                .bind(partition)
                .bind(commit_seq)
                .fetch_optional(p)
                .await?
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            sqlx::query_as(&sql)
                .bind(partition)
                .bind(commit_seq)
                .fetch_optional(p)
                .await?
        }
    };
    Ok(row.and_then(|(j,)| j).and_then(|s| serde_json::from_str(&s).ok()))
}

/// Commits whose `affected_tables` include `table` and whose `client_id`
/// is the distinguished external marker (spec §4.7 step 3 / §4.10).
pub async fn external_commits_touching_table(
    pool: &StorePool,
    partition: &str,
    table: &str,
    cursor_exclusive: i64,
) -> Result<Vec<i64>, StoreError> {
    let sql = "select tc.commit_seq from sync_table_commits tc join sync_commits c on c.partition_id = tc.partition_id and c.commit_seq = tc.commit_seq where tc.partition_id = $1 and tc.table_name = $2 and tc.commit_seq > $3 and c.client_id = $4 order by tc.commit_seq asc";
    let rows: Vec<(i64,)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(sql)
                .bind(partition)
                .bind(table)
                .bind(cursor_exclusive)
                .bind(sync_wire::EXTERNAL_CLIENT_ID)
                .fetch_all(p)
                .await?
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            sqlx::query_as(&sql)
                .bind(partition)
                .bind(table)
                .bind(cursor_exclusive)
                .bind(sync_wire::EXTERNAL_CLIENT_ID)
                .fetch_all(p)
                .await?
        }
    };
    Ok(rows.into_iter().map(|(s,)| s).collect())
}
