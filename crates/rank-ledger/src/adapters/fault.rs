//! Repository wrapper that fails on demand. For tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::warn;

use crate::domain::{LedgerError, LedgerResult, PendingPurchase, RankSet, Username};
use crate::ports::outbound::RankRepository;

/// Wraps a repository and injects `Storage` errors per operation class.
#[derive(Debug, Default)]
pub struct FaultInjectingRepository<R> {
    inner: R,
    fail_reads: AtomicBool,
    fail_rank_writes: AtomicBool,
    fail_pending_writes: AtomicBool,
    fail_account_writes: AtomicBool,
    calls: AtomicUsize,
}

impl<R: RankRepository> FaultInjectingRepository<R> {
    /// Wrap `inner` with every fault disabled.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_rank_writes: AtomicBool::new(false),
            fail_pending_writes: AtomicBool::new(false),
            fail_account_writes: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// The wrapped repository.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Fail every `load_*`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail `store_ranks` and `delete_ranks`.
    pub fn fail_rank_writes(&self, fail: bool) {
        self.fail_rank_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail `store_pending`.
    pub fn fail_pending_writes(&self, fail: bool) {
        self.fail_pending_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail `store_linked_accounts`.
    pub fn fail_account_writes(&self, fail: bool) {
        self.fail_account_writes.store(fail, Ordering::SeqCst);
    }

    /// Repository calls seen so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, switch: &AtomicBool, operation: &str) -> LedgerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if switch.load(Ordering::SeqCst) {
            warn!("[rank-ledger] injected failure in {}", operation);
            return Err(LedgerError::Storage(format!(
                "injected failure in {}",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: RankRepository> RankRepository for FaultInjectingRepository<R> {
    async fn load_ranks(&self, username: &Username) -> LedgerResult<Option<RankSet>> {
        self.check(&self.fail_reads, "load_ranks")?;
        self.inner.load_ranks(username).await
    }

    async fn store_ranks(&self, username: &Username, ranks: &RankSet) -> LedgerResult<()> {
        self.check(&self.fail_rank_writes, "store_ranks")?;
        self.inner.store_ranks(username, ranks).await
    }

    async fn load_all_ranks(&self) -> LedgerResult<Vec<(String, RankSet)>> {
        self.check(&self.fail_reads, "load_all_ranks")?;
        self.inner.load_all_ranks().await
    }

    async fn delete_ranks(&self, key: &str) -> LedgerResult<()> {
        self.check(&self.fail_rank_writes, "delete_ranks")?;
        self.inner.delete_ranks(key).await
    }

    async fn load_pending(&self) -> LedgerResult<Vec<PendingPurchase>> {
        self.check(&self.fail_reads, "load_pending")?;
        self.inner.load_pending().await
    }

    async fn store_pending(&self, purchases: &[PendingPurchase]) -> LedgerResult<()> {
        self.check(&self.fail_pending_writes, "store_pending")?;
        self.inner.store_pending(purchases).await
    }

    async fn load_linked_accounts(&self, user_id: &str) -> LedgerResult<Vec<String>> {
        self.check(&self.fail_reads, "load_linked_accounts")?;
        self.inner.load_linked_accounts(user_id).await
    }

    async fn store_linked_accounts(&self, user_id: &str, accounts: &[String]) -> LedgerResult<()> {
        self.check(&self.fail_account_writes, "store_linked_accounts")?;
        self.inner.store_linked_accounts(user_id, accounts).await
    }
}
