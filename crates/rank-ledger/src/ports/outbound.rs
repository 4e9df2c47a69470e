//! # Outbound Ports
//!
//! Persistence and clock dependencies of the rank ledger.
//!
//! Two storage shapes exist: a whole-value document store (`DocumentStore`)
//! and row-oriented tables. Both are adapted to `RankRepository`, which is
//! the only storage trait the application layer sees.

use async_trait::async_trait;
use serde_json::Value;
#[cfg(any(test, feature = "test-utils"))]
use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::{LedgerResult, PendingPurchase, RankSet, Timestamp, Username};

/// Collection-level storage for ranks, pending purchases and linked accounts.
///
/// Every method reads or replaces a whole logical collection; callers do
/// read-modify-write.
#[async_trait]
pub trait RankRepository: Send + Sync {
    /// Stored ranks for a username, `None` when never written.
    async fn load_ranks(&self, username: &Username) -> LedgerResult<Option<RankSet>>;

    /// Replace the ranks for a username.
    async fn store_ranks(&self, username: &Username, ranks: &RankSet) -> LedgerResult<()>;

    /// Every stored rank set under the key it is stored as.
    ///
    /// Keys written by this crate are normalized usernames; older data may
    /// hold mixed-case or padded keys.
    async fn load_all_ranks(&self) -> LedgerResult<Vec<(String, RankSet)>>;

    /// Drop the rank set stored under exactly `key`. Absent keys are a no-op.
    async fn delete_ranks(&self, key: &str) -> LedgerResult<()>;

    /// Full pending purchase list in insertion order.
    async fn load_pending(&self) -> LedgerResult<Vec<PendingPurchase>>;

    /// Replace the pending purchase list.
    async fn store_pending(&self, purchases: &[PendingPurchase]) -> LedgerResult<()>;

    /// Minecraft usernames linked to a site user, oldest first.
    async fn load_linked_accounts(&self, user_id: &str) -> LedgerResult<Vec<String>>;

    /// Replace the linked usernames for a site user.
    async fn store_linked_accounts(&self, user_id: &str, accounts: &[String]) -> LedgerResult<()>;
}

/// Key-value store holding one JSON document per key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current value, `None` if the key was never written.
    async fn get(&self, key: &str) -> LedgerResult<Option<Value>>;

    /// Replace the value under `key`.
    async fn put(&self, key: &str, value: Value) -> LedgerResult<()>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: AtomicI64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockTimeSource {
    /// Start at `initial`.
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: AtomicI64::new(initial),
        }
    }

    /// Move forward by `ms`.
    pub fn advance(&self, ms: i64) {
        self.time.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to `time`.
    pub fn set(&self, time: Timestamp) {
        self.time.store(time, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}
