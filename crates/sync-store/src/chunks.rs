//! Snapshot Chunk Store (spec §4.6): content-addressed, gzip-compressed
//! bootstrap pages, optionally offloaded to a [`crate::blob::BlobStore`].

use sha2::{Digest, Sha256};
use sync_wire::{SnapshotChunkRef, SyncError};

use crate::blob::BlobStore;
use crate::dialect::StorePool;
use crate::error::StoreError;

/// Identifies a bootstrap page uniquely: two requests for the same page
/// key must return the same chunk (spec §3 `SnapshotChunk`).
#[derive(Debug, Clone)]
pub struct PageKey {
    pub partition: String,
    pub scope_key: String,
    pub table: String,
    pub as_of_commit_seq: i64,
    pub row_cursor: Option<String>,
    pub row_limit: u32,
}

impl PageKey {
    fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|json-row-frame-v1|gzip",
            self.partition,
            self.scope_key,
            self.table,
            self.as_of_commit_seq,
            self.row_cursor.as_deref().unwrap_or(""),
            self.row_limit,
        )
    }
}

fn sha256_hex(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Primary-key id for a chunk row: content hash folded with the canonical
/// page key so two pages whose bodies happen to compress identically never
/// collide onto the same row.
fn chunk_id(canonical_page_key: &str, content_sha256: &str) -> String {
    sha256_hex(format!("{canonical_page_key}|{content_sha256}").as_bytes())
}

/// Store one gzip-compressed SRF1 chunk body. Idempotent: a second call
/// with the same page key returns the existing ref without rewriting.
///
/// When `blob_store` is `Some`, the body is offloaded there and only the
/// ref (not the bytes) lives in `sync_snapshot_chunks`; the ref is
/// recorded only after the blob write succeeds, per the "partial rows
/// must never be visible" failure semantics in spec §4.6.
pub async fn store_chunk(
    pool: &StorePool,
    page_key: &PageKey,
    body: &[u8],
    expires_at_ms: Option<i64>,
    blob_store: Option<&dyn BlobStore>,
) -> Result<SnapshotChunkRef, StoreError> {
    let canonical = page_key.canonical();
    if let Some(existing) = find_chunk(pool, page_key).await? {
        return Ok(existing);
    }

    let sha256 = sha256_hex(body);
    // `id` must be unique per page key, not just per content: two distinct
    // pages (e.g. different `row_cursor`s) can compress to byte-identical
    // bodies, and `sha256` alone would collide them onto one row. `sha256`
    // stays a plain content-equality column.
    let id = chunk_id(&canonical, &sha256);
    let byte_length = body.len() as i64;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let blob_ref: Option<String> = match blob_store {
        Some(store) => {
            store
                .put(&id, body)
                .await
                .map_err(|e| StoreError::Chunk(SyncError::Storage(e.to_string())))?;
            Some(id.clone())
        }
        None => None,
    };
    let inline_data: Option<&[u8]> = if blob_ref.is_none() { Some(body) } else { None };

    let insert_result = match pool {
        StorePool::Postgres(p) => {
            sqlx::query(
                "insert into sync_snapshot_chunks (id, partition_id, page_key, byte_length, sha256, encoding, compression, data, blob_ref, created_at_ms, expires_at_ms) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) on conflict (partition_id, page_key) do nothing",
            )
            .bind(&id)
            .bind(&page_key.partition)
            .bind(&canonical)
            .bind(byte_length)
            .bind(&sha256)
            .bind("json-row-frame-v1")
            .bind("gzip")
            .bind(inline_data)
            .bind(&blob_ref)
            .bind(now_ms)
            .bind(expires_at_ms)
            .execute(p)
            .await
        }
        StorePool::Sqlite(p) => {
            sqlx::query(
                "insert into sync_snapshot_chunks (id, partition_id, page_key, byte_length, sha256, encoding, compression, data, blob_ref, created_at_ms, expires_at_ms) values (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11) on conflict (partition_id, page_key) do nothing",
            )
            .bind(&id)
            .bind(&page_key.partition)
            .bind(&canonical)
            .bind(byte_length)
            .bind(&sha256)
            .bind("json-row-frame-v1")
            .bind("gzip")
            .bind(inline_data)
            .bind(&blob_ref)
            .bind(now_ms)
            .bind(expires_at_ms)
            .execute(p)
            .await
        }
    };
    insert_result?;

    // Another request may have won the race after our find_chunk miss; the
    // on-conflict-do-nothing above makes this safe either way.
    find_chunk(pool, page_key)
        .await?
        .ok_or_else(|| StoreError::Query("chunk vanished immediately after insert".to_string()))
}

/// Look up an existing chunk by page key without writing anything.
pub async fn find_chunk(
    pool: &StorePool,
    page_key: &PageKey,
) -> Result<Option<SnapshotChunkRef>, StoreError> {
    let canonical = page_key.canonical();
    let sql = "select id, byte_length, sha256, encoding, compression from sync_snapshot_chunks where partition_id = $1 and page_key = $2";
    let row: Option<(String, i64, String, String, String)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(sql)
                .bind(&page_key.partition)
                .bind(&canonical)
                .fetch_optional(p)
                .await?
        }
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            sqlx::query_as(&sql)
                .bind(&page_key.partition)
                .bind(&canonical)
                .fetch_optional(p)
                .await?
        }
    };
    Ok(row.map(|(id, byte_length, sha256, encoding, compression)| SnapshotChunkRef {
        id,
        byte_length: byte_length as u64,
        sha256,
        encoding,
        compression,
    }))
}

/// Read a chunk's compressed body by id, checking the blob store first
/// when the row has no inline `data`.
pub async fn read_chunk(
    pool: &StorePool,
    chunk_id: &str,
    blob_store: Option<&dyn BlobStore>,
) -> Result<Option<Vec<u8>>, StoreError> {
    let sql = "select data, blob_ref from sync_snapshot_chunks where id = $1";
    let row: Option<(Option<Vec<u8>>, Option<String>)> = match pool {
        StorePool::Postgres(p) => sqlx::query_as(sql).bind(chunk_id).fetch_optional(p).await?,
        StorePool::Sqlite(p) => {
            let sql = sql.replace('$', "?");
            sqlx::query_as(&sql).bind(chunk_id).fetch_optional(p).await?
        }
    };
    let Some((data, blob_ref)) = row else {
        return Ok(None);
    };
    if let Some(bytes) = data {
        return Ok(Some(bytes));
    }
    match (blob_ref, blob_store) {
        (Some(key), Some(store)) => Ok(store
            .get(&key)
            .await
            .map_err(|e| StoreError::Chunk(SyncError::Storage(e.to_string())))?),
        _ => Ok(None),
    }
}

/// Delete chunks past their expiry, reclaiming any offloaded blob bytes
/// first. Returns the number of rows deleted.
pub async fn cleanup_expired(
    pool: &StorePool,
    before_ms: i64,
    blob_store: Option<&dyn BlobStore>,
) -> Result<u64, StoreError> {
    let select_sql =
        "select blob_ref from sync_snapshot_chunks where expires_at_ms is not null and expires_at_ms < $1 and blob_ref is not null";
    let blob_refs: Vec<(String,)> = match pool {
        StorePool::Postgres(p) => {
            sqlx::query_as(select_sql).bind(before_ms).fetch_all(p).await?
        }
        StorePool::Sqlite(p) => {
            let sql = select_sql.replace('$', "?");
            sqlx::query_as(&sql).bind(before_ms).fetch_all(p).await?
        }
    };

    if let Some(store) = blob_store {
        for (blob_ref,) in &blob_refs {
            store
                .delete(blob_ref)
                .await
                .map_err(|e| StoreError::Chunk(SyncError::Storage(e.to_string())))?;
        }
    }

    let delete_sql = "delete from sync_snapshot_chunks where expires_at_ms is not null and expires_at_ms < $1";
    let affected = match pool {
        StorePool::Postgres(p) => {
            sqlx::query(delete_sql).bind(before_ms).execute(p).await?.rows_affected()
        }
        StorePool::Sqlite(p) => {
            let sql = delete_sql.replace('$', "?");
            sqlx::query(&sql).bind(before_ms).execute(p).await?.rows_affected()
        }
    };
    Ok(affected)
}

/// Delete every snapshot chunk whose `page_key` begins with one of
/// `tables` (i.e. `scope ∈ tables`), in `partition`. Called by
/// `notify_external_data_change` (spec §4.10) to force a fresh bootstrap.
pub async fn delete_chunks_for_tables(
    pool: &StorePool,
    partition: &str,
    tables: &[String],
) -> Result<u64, StoreError> {
    let mut total = 0u64;
    for table in tables {
        let pattern = format!("%|{table}|%");
        let sql = "delete from sync_snapshot_chunks where partition_id = $1 and page_key like $2";
        let affected = match pool {
            StorePool::Postgres(p) => {
                sqlx::query(sql)
                    .bind(partition)
                    .bind(&pattern)
                    .execute(p)
                    .await?
                    .rows_affected()
            }
            StorePool::Sqlite(p) => {
                let sql = sql.replace('$', "?");
                sqlx::query(&sql)
                    .bind(partition)
                    .bind(&pattern)
                    .execute(p)
                    .await?
                    .rows_affected()
            }
        };
        total += affected;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_page_key_includes_every_dimension() {
        let key = PageKey {
            partition: "default".to_string(),
            scope_key: "default::user:u1".to_string(),
            table: "tasks".to_string(),
            as_of_commit_seq: 42,
            row_cursor: Some("t99".to_string()),
            row_limit: 500,
        };
        let canon = key.canonical();
        assert!(canon.contains("default"));
        assert!(canon.contains("tasks"));
        assert!(canon.contains("42"));
        assert!(canon.contains("t99"));
        assert!(canon.contains("500"));
    }

    #[test]
    fn chunk_id_differs_for_same_body_under_distinct_page_keys() {
        let body_sha = sha256_hex(b"identical gzip body");
        let id_a = chunk_id("default|s1|tasks|1|t1|500|json-row-frame-v1|gzip", &body_sha);
        let id_b = chunk_id("default|s1|tasks|2|t1|500|json-row-frame-v1|gzip", &body_sha);
        assert_ne!(id_a, id_b);
    }
}
