//! Append-only request/operation event log: one writer, monotonic
//! sequence, no RNG in the id derivation. Writes land in the
//! `sync_request_events`/`sync_request_payloads`/`sync_operation_events`
//! tables the maintenance loop prunes.

use serde_json::Value;
use sha2::{Digest, Sha256};
use sync_store::{StoreError, StorePool};
use uuid::Uuid;

/// Deterministic event id: a UUIDv5 derived from a namespace plus the
/// monotonic sequence number. No hash-chain — there is no tamper-evidence
/// requirement on these operational rows, just a stable, reproducible id.
fn derive_event_id(namespace: Uuid, seq: u64) -> Uuid {
    Uuid::new_v5(&namespace, seq.to_be_bytes().as_slice())
}

pub struct AuditWriter {
    namespace: Uuid,
    seq: u64,
}

impl AuditWriter {
    /// `namespace` should be stable per server instance (e.g. derived from
    /// the partition id) so ids never collide across writers.
    pub fn new(namespace_seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace_seed.as_bytes());
        let digest = hasher.finalize();
        let namespace = Uuid::from_slice(&digest[..16]).unwrap_or(Uuid::NAMESPACE_OID);
        Self { namespace, seq: 0 }
    }

    fn next_id(&mut self) -> Uuid {
        let id = derive_event_id(self.namespace, self.seq);
        self.seq += 1;
        id
    }

    /// Record that a push or pull request was received, optionally
    /// persisting its raw payload for later inspection.
    pub async fn record_request(
        &mut self,
        pool: &StorePool,
        partition: &str,
        client_id: &str,
        actor_id: Option<&str>,
        kind: &str,
        status: &str,
        payload: Option<&Value>,
    ) -> Result<Uuid, StoreError> {
        let event_id = self.next_id();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let id_str = event_id.to_string();

        match pool {
            StorePool::Postgres(p) => {
                sqlx::query(
                    "insert into sync_request_events (event_id, partition_id, client_id, actor_id, kind, status, created_at_ms) values ($1,$2,$3,$4,$5,$6,$7)",
                )
                .bind(&id_str)
                .bind(partition)
                .bind(client_id)
                .bind(actor_id)
                .bind(kind)
                .bind(status)
                .bind(now_ms)
                .execute(p)
                .await?;
                if let Some(payload) = payload {
                    sqlx::query(
                        "insert into sync_request_payloads (event_id, payload_json) values ($1,$2)",
                    )
                    .bind(&id_str)
                    .bind(payload.to_string())
                    .execute(p)
                    .await?;
                }
            }
            StorePool::Sqlite(p) => {
                sqlx::query(
                    "insert into sync_request_events (event_id, partition_id, client_id, actor_id, kind, status, created_at_ms) values (?1,?2,?3,?4,?5,?6,?7)",
                )
                .bind(&id_str)
                .bind(partition)
                .bind(client_id)
                .bind(actor_id)
                .bind(kind)
                .bind(status)
                .bind(now_ms)
                .execute(p)
                .await?;
                if let Some(payload) = payload {
                    sqlx::query(
                        "insert into sync_request_payloads (event_id, payload_json) values (?1,?2)",
                    )
                    .bind(&id_str)
                    .bind(payload.to_string())
                    .execute(p)
                    .await?;
                }
            }
        }
        Ok(event_id)
    }

    /// Record one operation's outcome within a push, linked to its
    /// enclosing request event.
    pub async fn record_operation(
        &mut self,
        pool: &StorePool,
        request_event_id: Uuid,
        op_index: usize,
        table: &str,
        row_id: &str,
        result_status: &str,
    ) -> Result<Uuid, StoreError> {
        let event_id = self.next_id();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let id_str = event_id.to_string();
        let request_id_str = request_event_id.to_string();

        match pool {
            StorePool::Postgres(p) => {
                sqlx::query(
                    "insert into sync_operation_events (event_id, request_event_id, op_index, table_name, row_id, result_status, created_at_ms) values ($1,$2,$3,$4,$5,$6,$7)",
                )
                .bind(&id_str)
                .bind(&request_id_str)
                .bind(op_index as i32)
                .bind(table)
                .bind(row_id)
                .bind(result_status)
                .bind(now_ms)
                .execute(p)
                .await?;
            }
            StorePool::Sqlite(p) => {
                sqlx::query(
                    "insert into sync_operation_events (event_id, request_event_id, op_index, table_name, row_id, result_status, created_at_ms) values (?1,?2,?3,?4,?5,?6,?7)",
                )
                .bind(&id_str)
                .bind(&request_id_str)
                .bind(op_index as i32)
                .bind(table)
                .bind(row_id)
                .bind(result_status)
                .bind(now_ms)
                .execute(p)
                .await?;
            }
        }
        Ok(event_id)
    }
}
