//! # Document Repository
//!
//! `RankRepository` over a key-value `DocumentStore`, one JSON blob per
//! logical collection:
//!
//! - `user-data`: `{"users": {"<username>": {"ranks": [...]}}}`
//! - `pending-purchases`: `{"pendingPurchases": [...]}`
//! - `minecraft-accounts`: `{"<userId>": {"accounts": [...]}}`
//!
//! Fields this crate does not know about are carried through unchanged on
//! every rewrite. Mutations hold one writer lock across their read and
//! write, so two writers in this process never drop each other's entries.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{LedgerError, LedgerResult, PendingPurchase, RankSet, Username};
use crate::ports::outbound::{DocumentStore, RankRepository};

/// Key holding every user's ranks.
pub const USER_DATA_KEY: &str = "user-data";
/// Key holding the pending purchase list.
pub const PENDING_PURCHASES_KEY: &str = "pending-purchases";
/// Key holding linked Minecraft accounts.
pub const MINECRAFT_ACCOUNTS_KEY: &str = "minecraft-accounts";

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserDataDocument {
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    ranks: RankSet,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingDocument {
    #[serde(default)]
    pending_purchases: Vec<PendingPurchase>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountRecord {
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

type AccountsDocument = BTreeMap<String, AccountRecord>;

/// Rank repository storing whole collections in a [`DocumentStore`].
#[derive(Debug)]
pub struct DocumentRankRepository<S> {
    store: S,
    writer: Mutex<()>,
}

impl<S: DocumentStore> DocumentRankRepository<S> {
    /// Wrap a document store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn read<T: DeserializeOwned + Default + Send>(&self, key: &str) -> LedgerResult<T> {
        match self.store.get(key).await? {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| LedgerError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write<T: Serialize + Sync>(&self, key: &str, document: &T) -> LedgerResult<()> {
        let value = serde_json::to_value(document)
            .map_err(|e| LedgerError::Storage(format!("cannot encode '{}': {}", key, e)))?;
        self.store.put(key, value).await
    }
}

#[async_trait]
impl<S: DocumentStore> RankRepository for DocumentRankRepository<S> {
    async fn load_ranks(&self, username: &Username) -> LedgerResult<Option<RankSet>> {
        let document: UserDataDocument = self.read(USER_DATA_KEY).await?;
        Ok(document
            .users
            .get(username.as_str())
            .map(|record| record.ranks.clone()))
    }

    async fn store_ranks(&self, username: &Username, ranks: &RankSet) -> LedgerResult<()> {
        let _writer = self.writer.lock().await;
        let mut document: UserDataDocument = self.read(USER_DATA_KEY).await?;
        document
            .users
            .entry(username.as_str().to_string())
            .or_default()
            .ranks = ranks.clone();
        debug!(
            "[rank-ledger] document store_ranks {} -> {:?}",
            username,
            ranks.tokens()
        );
        self.write(USER_DATA_KEY, &document).await
    }

    async fn load_all_ranks(&self) -> LedgerResult<Vec<(String, RankSet)>> {
        let document: UserDataDocument = self.read(USER_DATA_KEY).await?;
        Ok(document
            .users
            .into_iter()
            .map(|(key, record)| (key, record.ranks))
            .collect())
    }

    async fn delete_ranks(&self, key: &str) -> LedgerResult<()> {
        let _writer = self.writer.lock().await;
        let mut document: UserDataDocument = self.read(USER_DATA_KEY).await?;
        if document.users.remove(key).is_none() {
            return Ok(());
        }
        debug!("[rank-ledger] document delete_ranks {:?}", key);
        self.write(USER_DATA_KEY, &document).await
    }

    async fn load_pending(&self) -> LedgerResult<Vec<PendingPurchase>> {
        let document: PendingDocument = self.read(PENDING_PURCHASES_KEY).await?;
        Ok(document.pending_purchases)
    }

    async fn store_pending(&self, purchases: &[PendingPurchase]) -> LedgerResult<()> {
        let _writer = self.writer.lock().await;
        let mut document: PendingDocument = self.read(PENDING_PURCHASES_KEY).await?;
        document.pending_purchases = purchases.to_vec();
        debug!("[rank-ledger] document store_pending ({} records)", purchases.len());
        self.write(PENDING_PURCHASES_KEY, &document).await
    }

    async fn load_linked_accounts(&self, user_id: &str) -> LedgerResult<Vec<String>> {
        let document: AccountsDocument = self.read(MINECRAFT_ACCOUNTS_KEY).await?;
        Ok(document
            .get(user_id)
            .map(|record| record.accounts.clone())
            .unwrap_or_default())
    }

    async fn store_linked_accounts(&self, user_id: &str, accounts: &[String]) -> LedgerResult<()> {
        let _writer = self.writer.lock().await;
        let mut document: AccountsDocument = self.read(MINECRAFT_ACCOUNTS_KEY).await?;
        document.entry(user_id.to_string()).or_default().accounts = accounts.to_vec();
        self.write(MINECRAFT_ACCOUNTS_KEY, &document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryDocumentStore;
    use serde_json::json;

    fn repository() -> DocumentRankRepository<InMemoryDocumentStore> {
        DocumentRankRepository::new(InMemoryDocumentStore::new())
    }

    #[tokio::test]
    async fn test_missing_documents_read_as_empty() {
        let repo = repository();
        let steve = Username::normalize("steve");
        assert!(repo.load_ranks(&steve).await.unwrap().is_none());
        assert!(repo.load_pending().await.unwrap().is_empty());
        assert!(repo.load_linked_accounts("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rank_blob_layout() {
        let repo = repository();
        let steve = Username::normalize("Steve");
        repo.store_ranks(&steve, &RankSet::from_tokens(["vip"]))
            .await
            .unwrap();

        assert_eq!(
            repo.store().document(USER_DATA_KEY),
            Some(json!({"users": {"steve": {"ranks": ["vip"]}}}))
        );
    }

    #[tokio::test]
    async fn test_unknown_fields_preserved() {
        let store = InMemoryDocumentStore::new().with_document(
            USER_DATA_KEY,
            json!({
                "version": 2,
                "users": {"alex": {"ranks": ["mvp"], "joined": "2024-01-01"}}
            }),
        );
        let repo = DocumentRankRepository::new(store);
        repo.store_ranks(&Username::normalize("steve"), &RankSet::from_tokens(["vip"]))
            .await
            .unwrap();

        let document = repo.store().document(USER_DATA_KEY).unwrap();
        assert_eq!(document["version"], 2);
        assert_eq!(document["users"]["alex"]["joined"], "2024-01-01");
        assert_eq!(document["users"]["steve"]["ranks"], json!(["vip"]));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_error() {
        let store = InMemoryDocumentStore::new()
            .with_document(PENDING_PURCHASES_KEY, json!({"pendingPurchases": "oops"}));
        let repo = DocumentRankRepository::new(store);

        let err = repo.load_pending().await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_pending_round_trip_keeps_order() {
        let repo = repository();
        let purchases = vec![
            PendingPurchase::new("cs_1", "vip", "steve", "u1").at(1),
            PendingPurchase::new("cs_2", "vip_to_mvp", "alex", "u2").at(2),
        ];
        repo.store_pending(&purchases).await.unwrap();
        assert_eq!(repo.load_pending().await.unwrap(), purchases);
    }

    #[tokio::test]
    async fn test_load_all_keeps_stored_keys() {
        let store = InMemoryDocumentStore::new().with_document(
            USER_DATA_KEY,
            json!({"users": {"Steve": {"ranks": ["vip"]}, "steve": {"ranks": ["knight"]}}}),
        );
        let repo = DocumentRankRepository::new(store);

        let keys: Vec<String> = repo
            .load_all_ranks()
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["Steve", "steve"]);
    }

    #[tokio::test]
    async fn test_delete_ranks_removes_exact_key() {
        let store = InMemoryDocumentStore::new().with_document(
            USER_DATA_KEY,
            json!({"users": {"Steve": {"ranks": ["vip"]}, "steve": {"ranks": ["knight"]}}}),
        );
        let repo = DocumentRankRepository::new(store);

        repo.delete_ranks("Steve").await.unwrap();
        repo.delete_ranks("nobody").await.unwrap();

        assert_eq!(repo.store().write_count(), 1);
        assert_eq!(
            repo.store().document(USER_DATA_KEY),
            Some(json!({"users": {"steve": {"ranks": ["knight"]}}}))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_every_user() {
        let repo = std::sync::Arc::new(repository());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let name = Username::normalize(&format!("player{}", i));
                    repo.store_ranks(&name, &RankSet::from_tokens(["vip"])).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repo.load_all_ranks().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_linked_accounts_blob_layout() {
        let repo = repository();
        repo.store_linked_accounts("u1", &["Steve".to_string()])
            .await
            .unwrap();
        assert_eq!(
            repo.store().document(MINECRAFT_ACCOUNTS_KEY),
            Some(json!({"u1": {"accounts": ["Steve"]}}))
        );
    }
}
