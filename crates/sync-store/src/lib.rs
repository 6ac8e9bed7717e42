//! sync-store
//!
//! Persistence layer for the Commit Log Store (spec §4.1) and the
//! Snapshot Chunk Store (spec §4.6), backed by either Postgres or SQLite
//! through `sync-store::dialect::StorePool`.

pub mod blob;
pub mod chunks;
pub mod commits;
pub mod cursors;
mod dialect;
mod error;
pub mod frame;
pub mod maintenance;
mod schema;

pub use dialect::{Dialect, StorePool, ENV_DB_URL};
pub use error::StoreError;
pub use schema::ensure_schema;
