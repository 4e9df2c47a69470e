//! # Inbound Ports
//!
//! API the rank ledger exposes to route handlers and admin tooling.
//!
//! Getters and single-record mutations never return errors; failures are
//! logged and reported through safe defaults or outcome values. Sweeps,
//! repairs and the `try_` variants return `Result` so callers can present
//! the reason.

use async_trait::async_trait;

use crate::domain::{
    CleanupCriteria, LedgerResult, PendingPurchase, RankSet, RankSetChange, RemovalOutcome,
    RepairReport, SweepReport,
};

/// Rank ledger API - inbound port.
#[async_trait]
pub trait RankLedgerApi: Send + Sync {
    /// Ranks owned by `username` (normalized). Empty on any failure.
    async fn get_rank_set(&self, username: &str) -> RankSet;

    /// Grant `rank_id` to `username`, reconciling upgrades. `false` on failure.
    async fn save_rank(&self, username: &str, rank_id: &str) -> bool;

    /// Same as `save_rank`, returning the persisted set or the error.
    async fn try_save_rank(&self, username: &str, rank_id: &str) -> LedgerResult<RankSet>;

    /// Every pending purchase. Empty on missing or corrupt data.
    async fn get_pending_purchases(&self) -> Vec<PendingPurchase>;

    /// Record a started checkout. `false` on failure.
    async fn add_pending_purchase(&self, purchase: PendingPurchase) -> bool;

    /// Remove by session id, falling back to `(rank_id, username)`.
    async fn remove_pending_purchase(
        &self,
        session_id: &str,
        rank_id: Option<&str>,
        username: Option<&str>,
    ) -> RemovalOutcome;

    /// Remove (or preview removing) purchases matching every criterion.
    async fn sweep_pending(
        &self,
        criteria: &CleanupCriteria,
        dry_run: bool,
    ) -> LedgerResult<SweepReport>;

    /// Reconcile every stored rank set, folding keys that normalize to the
    /// same username into one.
    async fn repair_rank_sets(&self) -> LedgerResult<RepairReport>;

    /// Repair one username. `None` when nothing is stored for it or it is
    /// already clean.
    async fn repair_rank_set(&self, username: &str) -> LedgerResult<Option<RankSetChange>>;

    /// Minecraft usernames linked to a site user. Empty on failure.
    async fn linked_accounts(&self, user_id: &str) -> Vec<String>;

    /// Link a username, evicting the oldest past the cap.
    async fn link_account(&self, user_id: &str, username: &str) -> LedgerResult<Vec<String>>;

    /// Unlink a username.
    async fn unlink_account(&self, user_id: &str, username: &str) -> LedgerResult<Vec<String>>;
}
