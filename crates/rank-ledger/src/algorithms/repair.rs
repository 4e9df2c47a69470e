//! # Rank Set Repair Planning
//!
//! Stored rank sets may sit under keys that are not normalized usernames
//! (`"Steve"`, `" steve"`), and several such keys can name the same player.
//! Planning groups them by normalized username, merges the sets in key
//! order, reconciles the result and lists the keys that must go.

use std::collections::BTreeMap;

use crate::algorithms::reconcile::reconcile_set;
use crate::domain::{RankSet, RankSetChange, Username};

/// What repair must do for one normalized username.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairPlan {
    /// Normalized username the result is written under.
    pub username: Username,
    /// Stored keys that normalize to `username` but differ from it.
    pub stale_keys: Vec<String>,
    /// Ranks as stored, merged across every key.
    pub before: RankSet,
    /// Reconciled ranks.
    pub after: RankSet,
}

impl RepairPlan {
    /// Anything to write or delete?
    pub fn needs_write(&self) -> bool {
        !self.stale_keys.is_empty() || self.before != self.after
    }

    /// Report entry for this plan.
    pub fn into_change(self) -> RankSetChange {
        RankSetChange {
            username: self.username,
            before: self.before,
            after: self.after,
            merged_keys: self.stale_keys,
        }
    }
}

/// Group stored `(key, ranks)` entries by normalized username and plan each.
///
/// A username stored under a single key keeps its set as is before
/// reconciliation. When several keys collide, their sets are concatenated
/// in key order without repeating a token. Keys that normalize to an empty
/// name are left alone.
pub fn plan_repairs(entries: Vec<(String, RankSet)>) -> Vec<RepairPlan> {
    let mut grouped: BTreeMap<Username, BTreeMap<String, RankSet>> = BTreeMap::new();
    for (key, ranks) in entries {
        let username = Username::normalize(&key);
        if username.is_empty() {
            continue;
        }
        grouped.entry(username).or_default().insert(key, ranks);
    }

    grouped
        .into_iter()
        .map(|(username, mut by_key)| {
            let before = if by_key.len() == 1 {
                by_key.pop_first().map(|(_, ranks)| ranks).unwrap_or_default()
            } else {
                let mut merged = RankSet::new();
                for rank in by_key.values().flatten() {
                    merged.push_unique(rank.clone());
                }
                merged
            };

            let stale_keys = by_key
                .into_keys()
                .filter(|key| key != username.as_str())
                .collect();
            let after = reconcile_set(&before);

            RepairPlan {
                username,
                stale_keys,
                before,
                after,
            }
        })
        .collect()
}
