//! # Domain Layer - Rank Ledger
//!
//! Pure types and rules. No I/O.
//!
//! ## Components
//!
//! - `entities`: RankId, RankSet, Username, PendingPurchase
//! - `value_objects`: CleanupCriteria, SweepReport, RemovalOutcome, RepairReport
//! - `invariants`: checks every reconciled rank set satisfies
//! - `errors`: LedgerError enumeration

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use value_objects::*;
