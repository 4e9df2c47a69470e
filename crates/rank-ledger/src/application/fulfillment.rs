//! # Purchase Fulfillment
//!
//! Applies a verified payment: grants the rank, then removes the pending
//! record on a detached task. The grant is the primary result; cleanup is
//! best-effort and reported separately through [`CleanupHandle`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::service::RankLedgerService;
use crate::domain::{
    normalize_username, LedgerError, LedgerResult, PendingPurchase, RankSet, RemovalOutcome,
};
use crate::ports::{RankLedgerApi, RankRepository};

/// Payment data confirmed by the payment processor.
///
/// Fields the processor did not carry are filled from the pending record
/// with the same session id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPurchase {
    /// Payment session id.
    pub session_id: String,
    /// Rank bought.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_id: Option<String>,
    /// Minecraft account receiving the rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_username: Option<String>,
    /// Paying site user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl VerifiedPurchase {
    /// Session with no processor metadata.
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Session with full metadata.
    pub fn new(
        session_id: impl Into<String>,
        rank_id: impl Into<String>,
        minecraft_username: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            rank_id: Some(rank_id.into()),
            minecraft_username: Some(minecraft_username.into()),
            user_id: None,
        }
    }
}

/// Pending-record removal scheduled after a grant.
#[derive(Debug)]
pub enum CleanupHandle {
    /// Removal running on the runtime.
    Scheduled(JoinHandle<RemovalOutcome>),
    /// No pending record existed, so nothing was scheduled.
    Skipped,
}

impl CleanupHandle {
    /// Was a removal task spawned?
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    /// Wait for the removal. A panicked or cancelled task reports failure.
    pub async fn wait(self) -> RemovalOutcome {
        match self {
            Self::Scheduled(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("[rank-ledger] pending cleanup task failed: {}", e);
                    RemovalOutcome::failed(e.to_string())
                }
            },
            Self::Skipped => RemovalOutcome::nothing_matched(),
        }
    }
}

/// Result of fulfilling a verified purchase.
#[derive(Debug)]
pub struct FulfillmentReceipt {
    /// Rank applied and persisted.
    pub ranks_granted: bool,
    /// Rank token that was applied.
    pub rank_id: String,
    /// Normalized receiving username.
    pub minecraft_username: String,
    /// Ranks after the grant. Empty when the grant failed.
    pub ranks: RankSet,
    /// Background removal of the pending record.
    pub cleanup: CleanupHandle,
}

impl<R: RankRepository + ?Sized + 'static> RankLedgerService<R> {
    /// Grant the rank from a verified payment and schedule removal of its
    /// pending record.
    ///
    /// Fails only when neither the payment nor a pending record supplies a
    /// rank and username. A failed grant is reported through
    /// `ranks_granted`; a failed cleanup never affects it.
    pub async fn fulfill(
        self: &Arc<Self>,
        verified: VerifiedPurchase,
    ) -> LedgerResult<FulfillmentReceipt> {
        let session_id = verified.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(LedgerError::Validation("session id is required".to_string()));
        }

        let pending: Option<PendingPurchase> = self
            .get_pending_purchases()
            .await
            .into_iter()
            .find(|purchase| purchase.session_id == session_id);

        let rank_id = verified
            .rank_id
            .filter(|rank| !rank.trim().is_empty())
            .or_else(|| pending.as_ref().map(|p| p.rank_id.to_string()));
        let username = verified
            .minecraft_username
            .filter(|name| !name.trim().is_empty())
            .or_else(|| pending.as_ref().map(|p| p.minecraft_username.clone()));

        let (rank_id, username) = match (rank_id, username) {
            (Some(rank_id), Some(username)) => (rank_id, username),
            _ => {
                return Err(LedgerError::Validation(format!(
                    "missing rank or username for session {}",
                    session_id
                )))
            }
        };

        let (ranks_granted, ranks) = match self.try_save_rank(&username, &rank_id).await {
            Ok(ranks) => (true, ranks),
            Err(e) => {
                error!(
                    "[rank-ledger] failed to grant {} to {} for session {}: {}",
                    rank_id, username, session_id, e
                );
                (false, RankSet::new())
            }
        };

        let cleanup = if pending.is_some() {
            let service = Arc::clone(self);
            let (rank, name) = (rank_id.clone(), username.clone());
            CleanupHandle::Scheduled(tokio::spawn(async move {
                let outcome = service
                    .remove_pending_purchase(&session_id, Some(&rank), Some(&name))
                    .await;
                if !outcome.success {
                    warn!(
                        "[rank-ledger] pending cleanup for session {} failed: {}",
                        session_id, outcome.message
                    );
                }
                outcome
            }))
        } else {
            CleanupHandle::Skipped
        };

        info!(
            "[rank-ledger] fulfilled {} for {} (granted: {}, cleanup scheduled: {})",
            rank_id,
            username,
            ranks_granted,
            cleanup.is_scheduled()
        );

        Ok(FulfillmentReceipt {
            ranks_granted,
            rank_id,
            minecraft_username: normalize_username(&username),
            ranks,
            cleanup,
        })
    }
}
