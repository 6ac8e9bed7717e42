//! Schema for the audit tables (spec §6): outside the sync core proper,
//! consumed only by the maintenance loop's audit-prune step.

use sync_store::{Dialect, StorePool, StoreError};

const TABLES_POSTGRES: &[&str] = &[
    r#"
    create table if not exists sync_request_events (
        event_id     text primary key,
        partition_id text not null,
        client_id    text not null,
        actor_id     text,
        kind         text not null,
        status       text not null,
        created_at_ms bigint not null
    )
    "#,
    r#"
    create table if not exists sync_request_payloads (
        event_id     text primary key references sync_request_events(event_id),
        payload_json text not null
    )
    "#,
    r#"
    create table if not exists sync_operation_events (
        event_id           text primary key,
        request_event_id   text not null references sync_request_events(event_id),
        op_index           integer not null,
        table_name         text not null,
        row_id             text not null,
        result_status      text not null,
        created_at_ms      bigint not null
    )
    "#,
];

const TABLES_SQLITE: &[&str] = &[
    r#"
    create table if not exists sync_request_events (
        event_id     text primary key,
        partition_id text not null,
        client_id    text not null,
        actor_id     text,
        kind         text not null,
        status       text not null,
        created_at_ms integer not null
    )
    "#,
    r#"
    create table if not exists sync_request_payloads (
        event_id     text primary key references sync_request_events(event_id),
        payload_json text not null
    )
    "#,
    r#"
    create table if not exists sync_operation_events (
        event_id           text primary key,
        request_event_id   text not null references sync_request_events(event_id),
        op_index           integer not null,
        table_name         text not null,
        row_id             text not null,
        result_status      text not null,
        created_at_ms      integer not null
    )
    "#,
];

const INDEXES: &[&str] = &[
    "create index if not exists idx_request_events_age on sync_request_events (created_at_ms)",
    "create index if not exists idx_operation_events_request on sync_operation_events (request_event_id)",
];

pub async fn ensure_schema(pool: &StorePool) -> Result<(), StoreError> {
    let statements: &[&str] = match pool.dialect() {
        Dialect::Postgres => TABLES_POSTGRES,
        Dialect::Sqlite => TABLES_SQLITE,
    };
    for stmt in statements.iter().chain(INDEXES.iter()) {
        exec(pool, stmt).await?;
    }
    Ok(())
}

async fn exec(pool: &StorePool, sql: &str) -> Result<(), StoreError> {
    match pool {
        StorePool::Postgres(p) => {
            sqlx::query(sql).execute(p).await.map_err(StoreError::from)?;
        }
        StorePool::Sqlite(p) => {
            sqlx::query(sql).execute(p).await.map_err(StoreError::from)?;
        }
    }
    Ok(())
}
