//! Audit prune (spec §4.9): bound `sync_request_events` /
//! `sync_operation_events` (and their dependent payload rows) by
//! `(maxAge, maxRows)`.

use sync_store::{StorePool, StoreError};

#[derive(Debug, Clone, Copy)]
pub struct AuditPruneInput {
    pub max_age_ms: i64,
    pub max_rows: i64,
    pub now_ms: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditPruneOutcome {
    pub request_events_deleted: u64,
    pub operation_events_deleted: u64,
}

/// Delete request events older than `maxAge`, then — if more than
/// `maxRows` remain — delete the oldest excess beyond that cap.
/// Operation events and payload rows cascade via their
/// `request_event_id`/`event_id` foreign keys.
pub async fn prune_audit(
    pool: &StorePool,
    input: AuditPruneInput,
) -> Result<AuditPruneOutcome, StoreError> {
    let age_cutoff = input.now_ms - input.max_age_ms;

    let by_age = delete_events_older_than(pool, age_cutoff).await?;
    let by_count = delete_events_beyond_row_cap(pool, input.max_rows).await?;

    Ok(AuditPruneOutcome {
        request_events_deleted: by_age.0 + by_count.0,
        operation_events_deleted: by_age.1 + by_count.1,
    })
}

async fn delete_events_older_than(
    pool: &StorePool,
    cutoff_ms: i64,
) -> Result<(u64, u64), StoreError> {
    let ops_sql = "delete from sync_operation_events where request_event_id in (select event_id from sync_request_events where created_at_ms < $1)";
    let payloads_sql =
        "delete from sync_request_payloads where event_id in (select event_id from sync_request_events where created_at_ms < $1)";
    let events_sql = "delete from sync_request_events where created_at_ms < $1";

    match pool {
        StorePool::Postgres(p) => {
            let ops = sqlx::query(ops_sql).bind(cutoff_ms).execute(p).await?.rows_affected();
            sqlx::query(payloads_sql).bind(cutoff_ms).execute(p).await?;
            let events = sqlx::query(events_sql).bind(cutoff_ms).execute(p).await?.rows_affected();
            Ok((events, ops))
        }
        StorePool::Sqlite(p) => {
            let ops_sql = ops_sql.replace('$', "?");
            let payloads_sql = payloads_sql.replace('$', "?");
            let events_sql = events_sql.replace('$', "?");
            let ops = sqlx::query(&ops_sql).bind(cutoff_ms).execute(p).await?.rows_affected();
            sqlx::query(&payloads_sql).bind(cutoff_ms).execute(p).await?;
            let events = sqlx::query(&events_sql).bind(cutoff_ms).execute(p).await?.rows_affected();
            Ok((events, ops))
        }
    }
}

async fn delete_events_beyond_row_cap(
    pool: &StorePool,
    max_rows: i64,
) -> Result<(u64, u64), StoreError> {
    // Keep only the newest `max_rows` request events; drop the rest (and
    // their cascaded operation/payload rows) regardless of age.
    let ops_sql = "delete from sync_operation_events where request_event_id in (select event_id from sync_request_events order by created_at_ms desc offset $1)";
    let payloads_sql = "delete from sync_request_payloads where event_id in (select event_id from sync_request_events order by created_at_ms desc offset $1)";
    let events_sql =
        "delete from sync_request_events where event_id in (select event_id from sync_request_events order by created_at_ms desc offset $1)";

    match pool {
        StorePool::Postgres(p) => {
            let ops = sqlx::query(ops_sql).bind(max_rows).execute(p).await?.rows_affected();
            sqlx::query(payloads_sql).bind(max_rows).execute(p).await?;
            let events = sqlx::query(events_sql).bind(max_rows).execute(p).await?.rows_affected();
            Ok((events, ops))
        }
        StorePool::Sqlite(p) => {
            let ops_sql = ops_sql.replace("offset $1", "limit -1 offset ?1");
            let payloads_sql = payloads_sql.replace("offset $1", "limit -1 offset ?1");
            let events_sql = events_sql.replace("offset $1", "limit -1 offset ?1");
            let ops = sqlx::query(&ops_sql).bind(max_rows).execute(p).await?.rows_affected();
            sqlx::query(&payloads_sql).bind(max_rows).execute(p).await?;
            let events = sqlx::query(&events_sql).bind(max_rows).execute(p).await?.rows_affected();
            Ok((events, ops))
        }
    }
}
