//! Postgres/SQLite dialect abstraction: a `connect_from_env`/pool-options
//! pattern generalized to both relational families this store supports.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};

use crate::StoreError;

pub const ENV_DB_URL: &str = "SYNC_DATABASE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// `$1`-style for Postgres, `?1`-style for SQLite.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::Sqlite => format!("?{n}"),
        }
    }
}

/// A connected pool for either backend, resolved once at startup from the
/// connection URL scheme.
#[derive(Clone)]
pub enum StorePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl StorePool {
    pub fn dialect(&self) -> Dialect {
        match self {
            StorePool::Postgres(_) => Dialect::Postgres,
            StorePool::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Connect using the scheme of `url` to pick the backend, mirroring the
    /// teacher's `connect_from_env` but dispatching on connection string
    /// rather than being hardwired to Postgres.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .map_err(|e| StoreError::Connect(e.to_string()))?;
            Ok(StorePool::Postgres(pool))
        } else if url.starts_with("sqlite:") {
            let pool = SqlitePoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .map_err(|e| StoreError::Connect(e.to_string()))?;
            Ok(StorePool::Sqlite(pool))
        } else {
            Err(StoreError::Connect(format!(
                "unrecognized database URL scheme: {url:?}"
            )))
        }
    }

    /// Connect using the URL in [`ENV_DB_URL`].
    pub async fn connect_from_env() -> Result<Self, StoreError> {
        let url = std::env::var(ENV_DB_URL)
            .map_err(|_| StoreError::Connect(format!("missing env var {ENV_DB_URL}")))?;
        Self::connect(&url).await
    }
}
