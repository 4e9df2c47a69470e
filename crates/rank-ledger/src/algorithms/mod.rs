//! # Algorithms
//!
//! Pure rank set reconciliation and pending purchase selection.

pub mod reconcile;
pub mod repair;
pub mod sweep;

pub use reconcile::{apply_rank, reconcile, reconcile_set, reconcile_tokens};
pub use repair::{plan_repairs, RepairPlan};
pub use sweep::{matches_criteria, partition_pending, remove_matching, SweepPartition};
