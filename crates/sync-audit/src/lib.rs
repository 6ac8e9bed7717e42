//! sync-audit
//!
//! Request/operation event log and its prune step (spec §4.9, §6). Sits
//! outside the sync core proper — the push/pull pipelines in `sync-engine`
//! write to it, and the maintenance loop prunes it — but nothing in the
//! core reads it back.

mod prune;
mod schema;
mod writer;

pub use prune::{prune_audit, AuditPruneInput, AuditPruneOutcome};
pub use schema::ensure_schema;
pub use writer::AuditWriter;
