//! `test_store_pool`: a throwaway in-memory SQLite `StorePool` with every
//! schema this workspace defines already applied.

use sync_store::StorePool;

/// Spin up an in-memory SQLite pool and run both the core store schema and
/// the audit schema against it. Each call gets its own isolated database.
pub async fn test_store_pool() -> StorePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite connect never fails");
    let store_pool = StorePool::Sqlite(pool);
    sync_store::ensure_schema(&store_pool)
        .await
        .expect("schema migration against a fresh in-memory db never fails");
    sync_audit::ensure_schema(&store_pool)
        .await
        .expect("audit schema migration against a fresh in-memory db never fails");
    store_pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_a_usable_pool() {
        let pool = test_store_pool().await;
        let latest = sync_store::commits::latest_commit_seq(&pool, "default")
            .await
            .unwrap();
        assert_eq!(latest, 0);
    }
}
