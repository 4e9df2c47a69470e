//! # Pending Purchase Selection
//!
//! Pure matching used by the sweep and by single-purchase removal.

use crate::domain::{
    CleanupCriteria, PendingPurchase, RemovalMatch, Timestamp, Username, MILLIS_PER_HOUR,
};

/// Does `purchase` satisfy every supplied criterion?
///
/// `criteria` must already be normalized. A purchase whose timestamp does
/// not parse never satisfies the age criterion.
pub fn matches_criteria(
    purchase: &PendingPurchase,
    criteria: &CleanupCriteria,
    now: Timestamp,
) -> bool {
    if let Some(session_id) = &criteria.session_id {
        if &purchase.session_id != session_id {
            return false;
        }
    }

    if let Some(rank_id) = &criteria.rank_id {
        if !purchase.rank_id.is_token(rank_id) {
            return false;
        }
    }

    if let Some(username) = &criteria.minecraft_username {
        if purchase.username().as_str() != username {
            return false;
        }
    }

    if let Some(user_id) = &criteria.user_id {
        if &purchase.user_id != user_id {
            return false;
        }
    }

    if let Some(hours) = criteria.older_than_hours {
        let window = i64::try_from(hours)
            .unwrap_or(i64::MAX)
            .saturating_mul(MILLIS_PER_HOUR);
        let cutoff = now.saturating_sub(window);
        match purchase.timestamp.as_millis() {
            Some(started) if started < cutoff => {}
            _ => return false,
        }
    }

    true
}

/// Purchases split into matched and kept, each in original order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepPartition {
    /// Matched every criterion.
    pub removed: Vec<PendingPurchase>,
    /// Everything else.
    pub remaining: Vec<PendingPurchase>,
}

/// Partition `purchases` by `criteria`.
pub fn partition_pending(
    purchases: Vec<PendingPurchase>,
    criteria: &CleanupCriteria,
    now: Timestamp,
) -> SweepPartition {
    let (removed, remaining) = purchases
        .into_iter()
        .partition(|purchase| matches_criteria(purchase, criteria, now));
    SweepPartition { removed, remaining }
}

/// Remove by exact session id, falling back to `(rank, username)` when the
/// session id matched nothing.
///
/// Returns the surviving purchases and, when something was removed, how
/// many and by which key.
pub fn remove_matching(
    purchases: Vec<PendingPurchase>,
    session_id: &str,
    fallback: Option<(&str, &Username)>,
) -> (Vec<PendingPurchase>, Option<(usize, RemovalMatch)>) {
    let before = purchases.len();
    let remaining: Vec<PendingPurchase> = purchases
        .iter()
        .filter(|purchase| purchase.session_id != session_id)
        .cloned()
        .collect();

    if remaining.len() < before {
        let removed = before - remaining.len();
        return (remaining, Some((removed, RemovalMatch::SessionId)));
    }

    if let Some((rank_id, username)) = fallback {
        let remaining: Vec<PendingPurchase> = purchases
            .iter()
            .filter(|purchase| !purchase.is_for(rank_id, username))
            .cloned()
            .collect();
        if remaining.len() < before {
            let removed = before - remaining.len();
            return (remaining, Some((removed, RemovalMatch::RankAndUsername)));
        }
    }

    (purchases, None)
}
