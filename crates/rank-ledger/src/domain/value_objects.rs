//! # Value Objects
//!
//! Sweep criteria and the structured reports returned by store operations.

use serde::{Deserialize, Serialize};

use super::entities::{normalize_username, PendingPurchase, RankSet, Username};
use super::errors::LedgerError;

/// Filter for the pending purchase sweep.
///
/// Every supplied field must match for a purchase to be removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupCriteria {
    /// Exact payment session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Exact rank token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_id: Option<String>,
    /// Minecraft username, compared normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_username: Option<String>,
    /// Exact site user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Only purchases strictly older than this many hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than_hours: Option<u64>,
}

impl CleanupCriteria {
    /// No constraints set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a session id.
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Match a rank token.
    pub fn rank_id(mut self, rank_id: impl Into<String>) -> Self {
        self.rank_id = Some(rank_id.into());
        self
    }

    /// Match a username.
    pub fn minecraft_username(mut self, username: impl Into<String>) -> Self {
        self.minecraft_username = Some(username.into());
        self
    }

    /// Match a site user id.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Match purchases older than `hours`.
    pub fn older_than_hours(mut self, hours: u64) -> Self {
        self.older_than_hours = Some(hours);
        self
    }

    /// Blank strings dropped, username normalized.
    pub fn normalized(&self) -> Self {
        fn keep(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Self {
            session_id: keep(&self.session_id),
            rank_id: keep(&self.rank_id),
            minecraft_username: keep(&self.minecraft_username).map(|u| normalize_username(&u)),
            user_id: keep(&self.user_id),
            older_than_hours: self.older_than_hours,
        }
    }

    /// No field set.
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.rank_id.is_none()
            && self.minecraft_username.is_none()
            && self.user_id.is_none()
            && self.older_than_hours.is_none()
    }

    /// Normalize and reject empty or out-of-range criteria.
    pub fn validated(&self) -> Result<Self, LedgerError> {
        let criteria = self.normalized();
        if criteria.older_than_hours == Some(0) {
            return Err(LedgerError::Validation(
                "olderThanHours must be greater than zero".to_string(),
            ));
        }
        if criteria.is_empty() {
            return Err(LedgerError::Validation(
                "at least one criterion is required (sessionId, rankId, minecraftUsername, userId or olderThanHours)"
                    .to_string(),
            ));
        }
        Ok(criteria)
    }
}

/// Result of a sweep, dry-run or not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Nothing was written.
    pub dry_run: bool,
    /// Purchases matched.
    pub removed_count: usize,
    /// Purchases left after removal.
    pub remaining_count: usize,
    /// The matched purchases.
    pub removed_purchases: Vec<PendingPurchase>,
    /// Criteria after normalization.
    pub criteria: CleanupCriteria,
}

/// Which key a pending purchase removal matched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalMatch {
    /// Exact session id.
    SessionId,
    /// `(rankId, normalized username)` fallback.
    RankAndUsername,
}

/// Outcome of `remove_pending_purchase`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalOutcome {
    /// Operation completed without a backend error.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Records removed.
    pub removed: usize,
    /// Key that matched, if any record was removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<RemovalMatch>,
}

impl RemovalOutcome {
    /// Records were removed.
    pub fn removed(removed: usize, matched_by: RemovalMatch) -> Self {
        Self {
            success: true,
            message: format!("Removed {} pending purchase(s)", removed),
            removed,
            matched_by: Some(matched_by),
        }
    }

    /// Nothing matched. Still a success.
    pub fn nothing_matched() -> Self {
        Self {
            success: true,
            message: "No matching pending purchase".to_string(),
            removed: 0,
            matched_by: None,
        }
    }

    /// Backend failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            removed: 0,
            matched_by: None,
        }
    }
}

/// Before/after for one repaired rank set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankSetChange {
    /// Normalized username.
    pub username: Username,
    /// Stored ranks before repair.
    pub before: RankSet,
    /// Reconciled ranks written back.
    pub after: RankSet,
    /// Stored keys other than `username` that were folded in and deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_keys: Vec<String>,
}

/// Result of reconciling every stored rank set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// Rank sets inspected.
    pub total_users: usize,
    /// Rank sets rewritten.
    pub users_fixed: usize,
    /// Any write happened.
    pub data_modified: bool,
    /// Per-user changes.
    pub changes: Vec<RankSetChange>,
}
