//! sync-handlers
//!
//! The Handler Registry and `TableHandler` contract (spec §4.3). The core
//! never introspects user row contents beyond what a handler returns; it
//! only ever holds handlers as trait objects behind `Arc`, registered one
//! per table.

mod contract;
mod registry;

pub use contract::{
    ApplyContext, ApplyOutcome, ApplyResult, EmittedChange, HandlerError, SnapshotContext,
    SnapshotPage, TableHandler,
};
pub use registry::{HandlerRegistry, RegistryError};
