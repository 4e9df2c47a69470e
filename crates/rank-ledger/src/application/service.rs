//! # Rank Ledger Service
//!
//! Application service implementing [`RankLedgerApi`] over any
//! [`RankRepository`].
//!
//! Every operation is a whole-collection read-modify-write. Concurrent
//! writers race with last-writer-wins semantics.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::algorithms::{apply_rank, partition_pending, plan_repairs, remove_matching, RepairPlan};
use crate::config::LedgerConfig;
use crate::domain::{
    normalize_username, CleanupCriteria, LedgerError, LedgerResult, PendingPurchase, RankId,
    RankSet, RankSetChange, RemovalOutcome, RepairReport, SweepReport, Username,
};
use crate::ports::{RankLedgerApi, RankRepository, SystemTimeSource, TimeSource};

/// Rank Ledger Service - store-level operations over a repository.
pub struct RankLedgerService<R: RankRepository + ?Sized> {
    /// Configuration.
    config: LedgerConfig,
    /// Persistence.
    repository: Arc<R>,
    /// Clock for age-based sweeps.
    clock: Arc<dyn TimeSource>,
}

impl<R: RankRepository + ?Sized> RankLedgerService<R> {
    /// Create a service using the wall clock.
    pub fn new(config: LedgerConfig, repository: Arc<R>) -> Self {
        Self {
            config,
            repository,
            clock: Arc::new(SystemTimeSource),
        }
    }

    /// Replace the clock.
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Underlying repository.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Current time from the configured clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn require_username(raw: &str) -> LedgerResult<Username> {
        let username = Username::normalize(raw);
        if username.is_empty() {
            return Err(LedgerError::Validation(
                "minecraft username must not be blank".to_string(),
            ));
        }
        Ok(username)
    }

    fn require_field<'a>(name: &str, value: &'a str) -> LedgerResult<&'a str> {
        let value = value.trim();
        if value.is_empty() {
            return Err(LedgerError::Validation(format!("{} must not be blank", name)));
        }
        Ok(value)
    }

    async fn try_add_pending(&self, purchase: PendingPurchase) -> LedgerResult<usize> {
        Self::require_field("sessionId", &purchase.session_id)?;
        let mut purchases = self.repository.load_pending().await?;
        purchases.push(purchase);
        self.repository.store_pending(&purchases).await?;
        Ok(purchases.len())
    }

    /// Write the reconciled set under the normalized key, then drop the
    /// stale keys it replaces.
    async fn apply_repair(&self, plan: RepairPlan) -> LedgerResult<RankSetChange> {
        self.repository.store_ranks(&plan.username, &plan.after).await?;
        for key in &plan.stale_keys {
            self.repository.delete_ranks(key).await?;
        }
        debug!(
            "[rank-ledger] repaired {}: {:?} -> {:?} (merged keys {:?})",
            plan.username,
            plan.before.tokens(),
            plan.after.tokens(),
            plan.stale_keys
        );
        Ok(plan.into_change())
    }

    async fn try_remove_pending(
        &self,
        session_id: &str,
        rank_id: Option<&str>,
        username: Option<&str>,
    ) -> LedgerResult<RemovalOutcome> {
        let fallback_username = username
            .map(Username::normalize)
            .filter(|name| !name.is_empty());
        let fallback_rank = rank_id.map(str::trim).filter(|rank| !rank.is_empty());
        let fallback = fallback_rank.zip(fallback_username.as_ref());

        let purchases = self.repository.load_pending().await?;
        let (remaining, removed) = remove_matching(purchases, session_id.trim(), fallback);

        match removed {
            None => {
                debug!(
                    "[rank-ledger] no pending purchase matched session {}",
                    session_id
                );
                Ok(RemovalOutcome::nothing_matched())
            }
            Some((count, matched_by)) => {
                self.repository.store_pending(&remaining).await?;
                info!(
                    "[rank-ledger] removed {} pending purchase(s) for session {} by {:?}",
                    count, session_id, matched_by
                );
                Ok(RemovalOutcome::removed(count, matched_by))
            }
        }
    }
}

#[async_trait]
impl<R: RankRepository + ?Sized> RankLedgerApi for RankLedgerService<R> {
    async fn get_rank_set(&self, username: &str) -> RankSet {
        let username = Username::normalize(username);
        if username.is_empty() {
            return RankSet::new();
        }

        match self.repository.load_ranks(&username).await {
            Ok(ranks) => ranks.unwrap_or_default(),
            Err(e) => {
                warn!("[rank-ledger] failed to load ranks for {}: {}", username, e);
                RankSet::new()
            }
        }
    }

    async fn save_rank(&self, username: &str, rank_id: &str) -> bool {
        match self.try_save_rank(username, rank_id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "[rank-ledger] failed to save rank {} for {}: {}",
                    rank_id, username, e
                );
                false
            }
        }
    }

    async fn try_save_rank(&self, username: &str, rank_id: &str) -> LedgerResult<RankSet> {
        let username = Self::require_username(username)?;
        let rank = RankId::parse(Self::require_field("rankId", rank_id)?);

        let current = self
            .repository
            .load_ranks(&username)
            .await?
            .unwrap_or_default();
        let next = apply_rank(&current, rank.clone());

        self.repository.store_ranks(&username, &next).await?;
        info!(
            "[rank-ledger] granted {} to {}: {:?} -> {:?}",
            rank,
            username,
            current.tokens(),
            next.tokens()
        );
        Ok(next)
    }

    async fn get_pending_purchases(&self) -> Vec<PendingPurchase> {
        match self.repository.load_pending().await {
            Ok(purchases) => purchases,
            Err(e) => {
                warn!("[rank-ledger] failed to load pending purchases: {}", e);
                Vec::new()
            }
        }
    }

    async fn add_pending_purchase(&self, purchase: PendingPurchase) -> bool {
        let session_id = purchase.session_id.clone();
        match self.try_add_pending(purchase).await {
            Ok(total) => {
                info!(
                    "[rank-ledger] recorded pending purchase {} ({} pending)",
                    session_id, total
                );
                true
            }
            Err(e) => {
                warn!(
                    "[rank-ledger] failed to record pending purchase {}: {}",
                    session_id, e
                );
                false
            }
        }
    }

    async fn remove_pending_purchase(
        &self,
        session_id: &str,
        rank_id: Option<&str>,
        username: Option<&str>,
    ) -> RemovalOutcome {
        match self.try_remove_pending(session_id, rank_id, username).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "[rank-ledger] failed to remove pending purchase {}: {}",
                    session_id, e
                );
                RemovalOutcome::failed(e.to_string())
            }
        }
    }

    async fn sweep_pending(
        &self,
        criteria: &CleanupCriteria,
        dry_run: bool,
    ) -> LedgerResult<SweepReport> {
        let criteria = criteria.validated()?;
        let now = self.clock.now();

        let purchases = self.repository.load_pending().await?;
        let partition = partition_pending(purchases, &criteria, now);

        if !dry_run && !partition.removed.is_empty() {
            self.repository.store_pending(&partition.remaining).await?;
        }

        info!(
            "[rank-ledger] sweep{} matched {} pending purchase(s), {} remain",
            if dry_run { " (dry run)" } else { "" },
            partition.removed.len(),
            partition.remaining.len()
        );

        Ok(SweepReport {
            dry_run,
            removed_count: partition.removed.len(),
            remaining_count: partition.remaining.len(),
            removed_purchases: partition.removed,
            criteria,
        })
    }

    async fn repair_rank_sets(&self) -> LedgerResult<RepairReport> {
        let plans = plan_repairs(self.repository.load_all_ranks().await?);
        let mut report = RepairReport {
            total_users: plans.len(),
            ..RepairReport::default()
        };

        for plan in plans.into_iter().filter(RepairPlan::needs_write) {
            report.changes.push(self.apply_repair(plan).await?);
        }

        report.users_fixed = report.changes.len();
        report.data_modified = report.users_fixed > 0;
        info!(
            "[rank-ledger] repair checked {} rank set(s), fixed {}",
            report.total_users, report.users_fixed
        );
        Ok(report)
    }

    async fn repair_rank_set(&self, username: &str) -> LedgerResult<Option<RankSetChange>> {
        let username = Self::require_username(username)?;
        let entries: Vec<_> = self
            .repository
            .load_all_ranks()
            .await?
            .into_iter()
            .filter(|(key, _)| username.matches(key))
            .collect();

        match plan_repairs(entries).into_iter().next() {
            Some(plan) if plan.needs_write() => {
                let change = self.apply_repair(plan).await?;
                info!(
                    "[rank-ledger] repaired {}: {:?}",
                    change.username,
                    change.after.tokens()
                );
                Ok(Some(change))
            }
            _ => {
                debug!("[rank-ledger] nothing to repair for {}", username);
                Ok(None)
            }
        }
    }

    async fn linked_accounts(&self, user_id: &str) -> Vec<String> {
        match self.repository.load_linked_accounts(user_id.trim()).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(
                    "[rank-ledger] failed to load linked accounts for {}: {}",
                    user_id, e
                );
                Vec::new()
            }
        }
    }

    async fn link_account(&self, user_id: &str, username: &str) -> LedgerResult<Vec<String>> {
        let user_id = Self::require_field("userId", user_id)?;
        let username = Self::require_field("minecraftUsername", username)?;
        let key = normalize_username(username);

        let mut accounts = self.repository.load_linked_accounts(user_id).await?;
        if accounts.iter().any(|account| normalize_username(account) == key) {
            return Ok(accounts);
        }

        accounts.push(username.to_string());
        while accounts.len() > self.config.max_linked_accounts {
            let evicted = accounts.remove(0);
            debug!(
                "[rank-ledger] evicted linked account {} for {}",
                evicted, user_id
            );
        }

        self.repository
            .store_linked_accounts(user_id, &accounts)
            .await?;
        info!("[rank-ledger] linked {} to user {}", username, user_id);
        Ok(accounts)
    }

    async fn unlink_account(&self, user_id: &str, username: &str) -> LedgerResult<Vec<String>> {
        let user_id = Self::require_field("userId", user_id)?;
        let key = normalize_username(username);

        let accounts = self.repository.load_linked_accounts(user_id).await?;
        let before = accounts.len();
        let remaining: Vec<String> = accounts
            .into_iter()
            .filter(|account| normalize_username(account) != key)
            .collect();

        if remaining.len() != before {
            self.repository
                .store_linked_accounts(user_id, &remaining)
                .await?;
            info!("[rank-ledger] unlinked {} from user {}", username, user_id);
        }
        Ok(remaining)
    }
}
