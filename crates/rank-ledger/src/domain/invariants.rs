//! # Domain Invariants
//!
//! Properties every reconciled rank set must satisfy.

use std::collections::HashSet;

use super::entities::{RankId, RankSet};

/// Invariant: no upgrade marker survives reconciliation.
///
/// Holds when every marker's halves are plain ranks. A destination that
/// itself contains `_to_` comes back out as a marker.
pub fn invariant_no_upgrade_markers(ranks: &[RankId]) -> bool {
    !ranks.iter().any(RankId::is_upgrade)
}

/// Invariant: no rank appears twice.
pub fn invariant_no_duplicates(ranks: &[RankId]) -> bool {
    let mut seen = HashSet::with_capacity(ranks.len());
    ranks.iter().all(|rank| seen.insert(rank))
}

/// Invariant: every marker in `input` has had its source consumed in
/// `output`, unless that source is also a destination the chain leads back to.
pub fn invariant_sources_consumed(input: &[RankId], output: &[RankId]) -> bool {
    let destinations: HashSet<&str> = input.iter().filter_map(RankId::destination).collect();
    input
        .iter()
        .filter_map(RankId::source)
        .filter(|source| !destinations.contains(source))
        .all(|source| !output.iter().any(|rank| rank.is_token(source)))
}

/// Convenience: all invariants for a set that contains only plain-component markers.
pub fn invariant_reconciled(input: &RankSet, output: &RankSet) -> bool {
    invariant_no_upgrade_markers(output.as_slice())
        && invariant_no_duplicates(output.as_slice())
        && invariant_sources_consumed(input.as_slice(), output.as_slice())
}
