//! External-data Notification Hook (spec §4.10): lets an out-of-band writer
//! (a migration, an admin tool, a batch job) tell the sync core "table X
//! changed outside any push" so every subscriber is forced to rebootstrap.

use sync_store::chunks;
use sync_store::commits::{self, AppendCommitInput};
use sync_store::StorePool;
use sync_wire::{SyncError, EXTERNAL_CLIENT_ID};

use crate::store_err;

/// What the hook actually did, for the caller's own logging.
#[derive(Debug, Clone)]
pub struct ExternalHookOutcome {
    pub commit_seq: i64,
    pub tables: Vec<String>,
    pub deleted_chunks: u64,
}

/// Record a synthetic, zero-change commit touching `tables` and drop every
/// cached snapshot chunk for them, so the next pull against any of these
/// tables detects the marker commit (via
/// `external_commits_touching_table`) and forces a fresh bootstrap rather
/// than trusting a cursor that predates the out-of-band write.
pub async fn notify_external_data_change(
    pool: &StorePool,
    settings: &sync_config::SyncSettings,
    partition: &str,
    actor_id: Option<&str>,
    tables: Vec<String>,
) -> Result<ExternalHookOutcome, SyncError> {
    if tables.is_empty() {
        return Err(SyncError::InvalidRequest(
            "notify_external_data_change requires at least one table".to_string(),
        ));
    }

    let input = AppendCommitInput {
        partition: partition.to_string(),
        actor_id: actor_id.unwrap_or(EXTERNAL_CLIENT_ID).to_string(),
        client_id: EXTERNAL_CLIENT_ID.to_string(),
        client_commit_id: format!("external-{}", uuid::Uuid::new_v4()),
        meta: None,
        result: None,
        changes: vec![],
        affected_tables_override: Some(tables.clone()),
    };
    let outcome = commits::append_commit(pool, &input, settings.max_append_retries)
        .await
        .map_err(store_err)?;

    let deleted_chunks = chunks::delete_chunks_for_tables(pool, partition, &tables)
        .await
        .map_err(store_err)?;

    Ok(ExternalHookOutcome {
        commit_seq: outcome.commit_seq,
        tables,
        deleted_chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> StorePool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store_pool = StorePool::Sqlite(pool);
        sync_store::ensure_schema(&store_pool).await.unwrap();
        store_pool
    }

    #[tokio::test]
    async fn records_a_marker_commit_and_clears_cached_chunks_for_the_table() {
        let pool = test_pool().await;
        let settings = sync_config::SyncSettings::default();

        let page_key = chunks::PageKey {
            partition: "default".to_string(),
            scope_key: "user:u1".to_string(),
            table: "tasks".to_string(),
            as_of_commit_seq: 1,
            row_cursor: None,
            row_limit: 500,
        };
        chunks::store_chunk(&pool, &page_key, b"stale", None, None)
            .await
            .unwrap();

        let outcome = notify_external_data_change(
            &pool,
            &settings,
            "default",
            None,
            vec!["tasks".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(outcome.tables, vec!["tasks".to_string()]);
        assert_eq!(outcome.deleted_chunks, 1);
        assert!(chunks::find_chunk(&pool, &page_key).await.unwrap().is_none());

        let touching = commits::external_commits_touching_table(&pool, "default", "tasks", 0)
            .await
            .unwrap();
        assert_eq!(touching, vec![outcome.commit_seq]);
    }

    #[tokio::test]
    async fn empty_table_list_is_rejected() {
        let pool = test_pool().await;
        let settings = sync_config::SyncSettings::default();
        let err = notify_external_data_change(&pool, &settings, "default", None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
    }
}
