//! # Rank Ledger
//!
//! Rank ownership and purchase bookkeeping for a Minecraft server store.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Ranks are sold as plain tokens (`vip`) and as upgrade tokens
//! (`vip_to_mvp`). This crate keeps each player's owned ranks consistent:
//! - Reconciliation collapses upgrade markers into net ownership
//! - A store adapter persists ranks and in-flight purchases over
//!   interchangeable backends
//! - A criteria-based sweep clears abandoned pending purchases
//! - Repair reconciles stored rank sets, folding legacy mixed-case keys
//!   into the normalized one
//!
//! ## Guarantees
//!
//! | Property | Description |
//! |----------|-------------|
//! | Idempotent | Reconciling a reconciled set changes nothing |
//! | Marker-free | Saved sets hold no upgrade marker with plain halves |
//! | Normalized keys | Usernames are trimmed and lowercased everywhere |
//! | Safe reads | Getters return empty values instead of errors |
//!
//! ## Module Structure
//!
//! ```text
//! rank-ledger/
//! ├── domain/          # RankId, RankSet, PendingPurchase, criteria, errors
//! ├── algorithms/      # Reconciliation, repair planning, pending purchase selection
//! ├── ports/           # API trait (inbound) + storage/clock traits (outbound)
//! ├── adapters/        # Memory, JSON-file and SQLite backends
//! ├── application/     # RankLedgerService, purchase fulfillment
//! └── config.rs        # LedgerConfig
//! ```
//!
//! ## Example
//!
//! ```
//! use rank_ledger::reconcile_tokens;
//!
//! let ranks = reconcile_tokens(&["vip", "knight", "vip_to_mvp"]);
//! assert_eq!(ranks, vec!["knight", "mvp"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    build_repository, DocumentRankRepository, FileDocumentStore, InMemoryDocumentStore,
    RelationalRankRepository, MINECRAFT_ACCOUNTS_KEY, PENDING_PURCHASES_KEY, USER_DATA_KEY,
};
pub use algorithms::{
    apply_rank, matches_criteria, partition_pending, plan_repairs, reconcile, reconcile_set,
    reconcile_tokens, remove_matching, RepairPlan, SweepPartition,
};
pub use application::{CleanupHandle, FulfillmentReceipt, RankLedgerService, VerifiedPurchase};
pub use config::{LedgerConfig, StorageBackend, DEFAULT_MAX_LINKED_ACCOUNTS};
pub use domain::{
    invariant_no_duplicates, invariant_no_upgrade_markers, invariant_reconciled,
    invariant_sources_consumed, normalize_username, CleanupCriteria, LedgerError, LedgerResult,
    PendingPurchase, PurchaseTimestamp, RankId, RankSet, RankSetChange, RemovalMatch,
    RemovalOutcome, RepairReport, SweepReport, Timestamp, Username, UPGRADE_DELIMITER,
};
pub use ports::{DocumentStore, RankLedgerApi, RankRepository, SystemTimeSource, TimeSource};

#[cfg(any(test, feature = "test-utils"))]
pub use adapters::FaultInjectingRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use ports::MockTimeSource;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service over a boxed repository, as built from configuration.
pub type DynRankLedger = RankLedgerService<dyn RankRepository>;

/// Build a service for `config` using the wall clock.
pub async fn open(config: LedgerConfig) -> LedgerResult<std::sync::Arc<DynRankLedger>> {
    let repository = build_repository(&config).await?;
    Ok(std::sync::Arc::new(RankLedgerService::new(config, repository)))
}
