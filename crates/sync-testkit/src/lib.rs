//! sync-testkit
//!
//! Fixtures for exercising `TableHandler` implementations and the sync
//! pipelines without a real database or blob backend: an in-memory handler
//! (`InMemoryTableHandler`), an in-memory `BlobStore`, and a helper that
//! spins up a throwaway SQLite-backed `StorePool` with every schema
//! applied. None of this is wired into `sync-engine`'s own production
//! path — it exists purely so downstream crates' tests don't each
//! reinvent the same scaffolding.

mod blob;
mod handler;
mod pool;

pub use blob::MemoryBlobStore;
pub use handler::{InMemoryTableHandler, StoredRow};
pub use pool::test_store_pool;
