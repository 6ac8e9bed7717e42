//! `ClientCursor` persistence (spec §3): how far a client's subscription
//! has caught up, per partition.

use crate::dialect::StorePool;
use crate::error::StoreError;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Record (or advance) a subscription's cursor after a successful pull.
pub async fn upsert_cursor(
    pool: &StorePool,
    partition: &str,
    client_id: &str,
    subscription_id: &str,
    cursor: i64,
) -> Result<(), StoreError> {
    let now_ms = now_millis();
    match pool {
        StorePool::Postgres(p) => {
            sqlx::query(
                "insert into sync_client_cursors (partition_id, client_id, subscription_id, cursor, updated_at_ms) values ($1,$2,$3,$4,$5) on conflict (partition_id, client_id, subscription_id) do update set cursor = excluded.cursor, updated_at_ms = excluded.updated_at_ms",
            )
            .bind(partition)
            .bind(client_id)
            .bind(subscription_id)
            .bind(cursor)
            .bind(now_ms)
            .execute(p)
            .await?;
        }
        StorePool::Sqlite(p) => {
            sqlx::query(
                "insert into sync_client_cursors (partition_id, client_id, subscription_id, cursor, updated_at_ms) values (?1,?2,?3,?4,?5) on conflict (partition_id, client_id, subscription_id) do update set cursor = excluded.cursor, updated_at_ms = excluded.updated_at_ms",
            )
            .bind(partition)
            .bind(client_id)
            .bind(subscription_id)
            .bind(cursor)
            .bind(now_ms)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

/// The oldest cursor among all subscriptions in `partition`, used by the
/// prune maintenance loop to compute its watermark.
pub async fn oldest_active_cursor(
    pool: &StorePool,
    partition: &str,
) -> Result<Option<i64>, StoreError> {
    let sql = "select min(cursor) from sync_client_cursors where partition_id = $1";
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
