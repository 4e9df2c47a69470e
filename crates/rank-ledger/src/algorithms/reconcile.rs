//! # Rank Set Reconciliation
//!
//! Collapses upgrade markers and their source ranks into net ownership.
//!
//! ## Algorithm
//!
//! 1. Scan once, collecting marker sources and destinations.
//! 2. Keep every plain rank that is not a source, in input order, first
//!    occurrence only.
//! 3. Append each destination, resolved through any chain of markers in the
//!    same input (`vip_to_mvp` + `mvp_to_noble` yields `noble`), skipping
//!    ranks already present.
//!
//! Input without markers is returned untouched, duplicates and order included.

use std::collections::{HashMap, HashSet};

use crate::domain::{RankId, RankSet};

/// Reconcile an ordered list of rank ids.
///
/// Total and side-effect free.
pub fn reconcile(ranks: &[RankId]) -> Vec<RankId> {
    if !ranks.iter().any(RankId::is_upgrade) {
        return ranks.to_vec();
    }

    let mut sources: HashSet<&str> = HashSet::new();
    let mut upgrades: HashMap<&str, &str> = HashMap::new();
    let mut destinations: Vec<&str> = Vec::new();

    for rank in ranks {
        if let RankId::Upgrade {
            source,
            destination,
        } = rank
        {
            sources.insert(source.as_str());
            upgrades.entry(source.as_str()).or_insert(destination.as_str());
            destinations.push(destination.as_str());
        }
    }

    let mut reconciled: Vec<RankId> = Vec::with_capacity(ranks.len());
    for rank in ranks {
        match rank {
            RankId::Upgrade { .. } => {}
            RankId::Plain(name) if sources.contains(name.as_str()) => {}
            plain => {
                if !reconciled.contains(plain) {
                    reconciled.push(plain.clone());
                }
            }
        }
    }

    for destination in destinations {
        let resolved = RankId::parse(resolve_chain(destination, &upgrades));
        if !reconciled.contains(&resolved) {
            reconciled.push(resolved);
        }
    }

    reconciled
}

/// Follow `source -> destination` links from `start` until a rank with no
/// onward upgrade, or until the next hop would revisit a rank.
fn resolve_chain<'a>(start: &'a str, upgrades: &HashMap<&'a str, &'a str>) -> &'a str {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = start;
    while let Some(&next) = upgrades.get(current) {
        if !visited.insert(current) || visited.contains(next) {
            break;
        }
        current = next;
    }
    current
}

/// Reconcile a [`RankSet`].
pub fn reconcile_set(ranks: &RankSet) -> RankSet {
    RankSet::from(reconcile(ranks.as_slice()))
}

/// Reconcile raw string tokens.
///
/// Accepts any strings; marker-free input comes back byte-identical.
pub fn reconcile_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    let ranks: Vec<RankId> = tokens.iter().map(|t| RankId::parse(t.as_ref())).collect();
    reconcile(&ranks).iter().map(ToString::to_string).collect()
}

/// Apply one purchased rank to an owned set.
///
/// Plain ranks are appended if absent. Upgrade markers reconcile
/// `[...current, marker]`, which also clears any stale markers left in
/// `current`.
pub fn apply_rank(current: &RankSet, rank: RankId) -> RankSet {
    if rank.is_upgrade() {
        let mut ranks = current.as_slice().to_vec();
        ranks.push(rank);
        return RankSet::from(reconcile(&ranks));
    }

    let mut next = current.clone();
    next.push_unique(rank);
    next
}
