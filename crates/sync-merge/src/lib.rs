//! sync-merge
//!
//! Conflict & Merge Core (spec §4.4) plus the prune watermark computation
//! used by the maintenance loop's prune pass (spec §4.9).
//!
//! Deterministic, pure logic. No IO.

mod merge;
mod watermark;

pub use merge::{json_eq, perform_field_level_merge, MergeOutcome};
pub use watermark::{compute_prune_watermark, PruneWatermarkInput};
