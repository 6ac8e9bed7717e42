//! Idempotent schema setup.
//!
//! Hand-rolls `CREATE TABLE IF NOT EXISTS` rather than a `sqlx::migrate!`
//! checked-in `migrations/` directory, so schema creation needs no
//! migration files and no build-time database connection, matching the
//! "runtime-bound queries only" constraint this workspace runs under.
//! Column types use the lowest common denominator (`TEXT`/`BIGINT`/`BLOB`)
//! so DDL only differs in autoincrement syntax.

use crate::dialect::{Dialect, StorePool};
use crate::error::StoreError;

const TABLES_POSTGRES: &[&str] = &[
    r#"
    create table if not exists sync_commits (
        commit_seq         bigint primary key,
        partition_id       text not null,
        client_id          text not null,
        client_commit_id   text not null,
        actor_id           text not null,
        created_at_ms      bigint not null,
        meta_json          text,
        result_json        text,
        change_count       integer not null,
        affected_tables    text not null,
        unique (partition_id, client_id, client_commit_id)
    )
    "#,
    r#"
    create table if not exists sync_changes (
        commit_seq   bigint not null,
        partition_id text not null,
        table_name   text not null,
        row_id       text not null,
        op           text not null,
        row_json     text,
        row_version  bigint,
        scopes_json  text not null,
        primary key (commit_seq, table_name, row_id)
    )
    "#,
    r#"
    create table if not exists sync_table_commits (
        commit_seq   bigint not null,
        partition_id text not null,
        table_name   text not null,
        primary key (commit_seq, table_name)
    )
    "#,
    r#"
    create table if not exists sync_client_cursors (
        partition_id    text not null,
        client_id       text not null,
        subscription_id text not null,
        cursor          bigint not null,
        updated_at_ms   bigint not null,
        primary key (partition_id, client_id, subscription_id)
    )
    "#,
    r#"
    create table if not exists sync_snapshot_chunks (
        id            text primary key,
        partition_id  text not null,
        page_key      text not null,
        byte_length   bigint not null,
        sha256        text not null,
        encoding      text not null,
        compression   text not null,
        data          bytea,
        blob_ref      text,
        created_at_ms bigint not null,
        expires_at_ms bigint,
        unique (partition_id, page_key)
    )
    "#,
];

const TABLES_SQLITE: &[&str] = &[
    r#"
    create table if not exists sync_commits (
        commit_seq         integer primary key,
        partition_id       text not null,
        client_id          text not null,
        client_commit_id   text not null,
        actor_id           text not null,
        created_at_ms      integer not null,
        meta_json          text,
        result_json        text,
        change_count        integer not null,
        affected_tables    text not null,
        unique (partition_id, client_id, client_commit_id)
    )
    "#,
    r#"
    create table if not exists sync_changes (
        commit_seq   integer not null,
        partition_id text not null,
        table_name   text not null,
        row_id       text not null,
        op           text not null,
        row_json     text,
        row_version  integer,
        scopes_json  text not null,
        primary key (commit_seq, table_name, row_id)
    )
    "#,
    r#"
    create table if not exists sync_table_commits (
        commit_seq   integer not null,
        partition_id text not null,
        table_name   text not null,
        primary key (commit_seq, table_name)
    )
    "#,
    r#"
    create table if not exists sync_client_cursors (
        partition_id    text not null,
        client_id       text not null,
        subscription_id text not null,
        cursor          integer not null,
        updated_at_ms   integer not null,
        primary key (partition_id, client_id, subscription_id)
    )
    "#,
    r#"
    create table if not exists sync_snapshot_chunks (
        id            text primary key,
        partition_id  text not null,
        page_key      text not null,
        byte_length   integer not null,
        sha256        text not null,
        encoding      text not null,
        compression   text not null,
        data          blob,
        blob_ref      text,
        created_at_ms integer not null,
        expires_at_ms integer,
        unique (partition_id, page_key)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "create index if not exists idx_table_commits_lookup on sync_table_commits (partition_id, table_name, commit_seq)",
    "create index if not exists idx_changes_commit on sync_changes (partition_id, commit_seq)",
];

/// Create every sync table/index if absent. Safe to call on every startup.
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
            sqlx::query(sql)
                .execute(p)
                .await
                .map_err(|e| StoreError::Schema(e.to_string()))?;
        }
        StorePool::Sqlite(p) => {
            sqlx::query(sql)
                .execute(p)
                .await
                .map_err(|e| StoreError::Schema(e.to_string()))?;
        }
    }
    Ok(())
}
