//! Physical prune/compact operations (spec §4.9). The watermark itself is
//! computed by the pure function in `sync-merge::watermark`; this module
//! only executes the resulting deletes.

use crate::dialect::StorePool;
use crate::error::StoreError;

/// Delete every Commit (and cascaded Change/TableCommit rows) with
/// `commit_seq <= watermark`. Returns the number of commits removed.
pub async fn prune_commits(
    pool: &StorePool,
    partition: &str,
    watermark: i64,
) -> Result<u64, StoreError> {
    let del_changes = "delete from sync_changes where partition_id = $1 and commit_seq <= $2";
    let del_table_commits =
        "delete from sync_table_commits where partition_id = $1 and commit_seq <= $2";
    let del_commits = "delete from sync_commits where partition_id = $1 and commit_seq <= $2";

    match pool {
        StorePool::Postgres(p) => {
            let mut tx = p.begin().await?;
            sqlx::query(del_changes).bind(partition).bind(watermark).execute(&mut *tx).await?;
            sqlx::query(del_table_commits).bind(partition).bind(watermark).execute(&mut *tx).await?;
            let result = sqlx::query(del_commits).bind(partition).bind(watermark).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(result.rows_affected())
        }
        StorePool::Sqlite(p) => {
            let del_changes = del_changes.replace('$', "?");
            let del_table_commits = del_table_commits.replace('$', "?");
            let del_commits = del_commits.replace('$', "?");
            let mut tx = p.begin().await?;
            sqlx::query(&del_changes).bind(partition).bind(watermark).execute(&mut *tx).await?;
            sqlx::query(&del_table_commits).bind(partition).bind(watermark).execute(&mut *tx).await?;
            let result = sqlx::query(&del_commits).bind(partition).bind(watermark).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(result.rows_affected())
        }
    }
}

/// Collapse per-`(table, row_id)` change history older than `before_ms` to
/// only the latest row per group; the owning Commit rows are untouched so
/// `commitSeq` stays dense.
pub async fn compact(pool: &StorePool, partition: &str, before_ms: i64) -> Result<u64, StoreError> {
    // The commit with the greatest commit_seq per (table, row_id) among the
    // old ones survives; every older sibling in that group is deleted.
    let sql = r#"
        delete from sync_changes
        where partition_id = $1
          and commit_seq in (select c.commit_seq from sync_commits c where c.partition_id = $1 and c.created_at_ms < $2)
          and commit_seq < (
              select max(c2.commit_seq)
              from sync_changes ch2
              join sync_commits c2 on c2.partition_id = ch2.partition_id and c2.commit_seq = ch2.commit_seq
              where ch2.partition_id = sync_changes.partition_id
                and ch2.table_name = sync_changes.table_name
                and ch2.row_id = sync_changes.row_id
                and c2.created_at_ms < $2
          )
    "#;
    let affected = match pool {
        StorePool::Postgres(p) => {
            sqlx::query(sql)
                .bind(partition)
                .bind(before_ms)
                .execute(p)
                .await?
                .rows_affected()
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            sqlx::query(&sql)
                .bind(partition)
                .bind(before_ms)
                .execute(p)
                .await?
                .rows_affected()
        }
    };
    Ok(affected)
}
