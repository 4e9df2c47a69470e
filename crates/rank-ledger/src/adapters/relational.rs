//! # Relational Repository
//!
//! Row-per-record tables in SQLite, reached through an `sqlx` pool:
//!
//! ```text
//! user_ranks          (id, minecraft_username, rank_id)
//! pending_purchases   (id, session_id, rank_id, minecraft_username, user_id,
//!                      started_at_ms, started_at_text, is_gift, recipient)
//! minecraft_accounts  (id, user_id, username)
//! ```
//!
//! Row ids are SQLite auto-increment keys and define insertion order.
//! Replacing a collection deletes its rows and inserts the new ones inside
//! one transaction.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::is_in_memory_url;
use crate::domain::{
    LedgerError, LedgerResult, PendingPurchase, PurchaseTimestamp, RankId, RankSet, Username,
};
use crate::ports::outbound::RankRepository;

/// Table definitions (embedded).
const SCHEMA: &str = include_str!("relational_schema.sql");

/// Connections kept for a file-backed database.
const MAX_CONNECTIONS: u32 = 4;

/// How long a writer waits on SQLite's database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Auto-increment row id.
pub type RowId = i64;

/// One owned rank.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRankRow {
    /// Row id.
    pub id: RowId,
    /// Normalized username.
    pub minecraft_username: String,
    /// Rank token.
    pub rank_id: String,
}

/// One pending purchase.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingPurchaseRow {
    /// Row id.
    pub id: RowId,
    /// Payment session id.
    pub session_id: String,
    /// Rank token.
    pub rank_id: String,
    /// Username as typed by the buyer.
    pub minecraft_username: String,
    /// Paying site user.
    pub user_id: String,
    /// Checkout start as epoch milliseconds.
    pub started_at_ms: Option<i64>,
    /// Checkout start as ISO text.
    pub started_at_text: Option<String>,
    /// Bought for someone else.
    pub is_gift: bool,
    /// Gift recipient.
    pub recipient: Option<String>,
}

impl PendingPurchaseRow {
    fn into_purchase(self) -> LedgerResult<PendingPurchase> {
        let timestamp = match (self.started_at_ms, self.started_at_text) {
            (Some(ms), _) => PurchaseTimestamp::EpochMillis(ms),
            (None, Some(text)) => PurchaseTimestamp::Iso(text),
            (None, None) => {
                return Err(LedgerError::Corrupt {
                    key: "pending_purchases".to_string(),
                    reason: format!("row {} has no start time", self.id),
                })
            }
        };

        Ok(PendingPurchase {
            session_id: self.session_id,
            rank_id: RankId::parse(self.rank_id),
            minecraft_username: self.minecraft_username,
            user_id: self.user_id,
            timestamp,
            is_gift: self.is_gift,
            recipient: self.recipient,
        })
    }
}

/// One linked Minecraft account.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct MinecraftAccountRow {
    /// Row id.
    pub id: RowId,
    /// Site user.
    pub user_id: String,
    /// Username as typed.
    pub username: String,
}

/// Rank repository over SQLite tables.
#[derive(Debug, Clone)]
pub struct RelationalRankRepository {
    pool: Pool<Sqlite>,
}

impl RelationalRankRepository {
    /// Connect to `url` (e.g. `sqlite://data/ranks.db`), creating the
    /// database file and tables if needed.
    pub async fn connect(url: &str) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                LedgerError::Configuration(format!("invalid database url '{}': {}", url, e))
            })?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        // Every connection to an in-memory database sees its own empty copy,
        // so keep exactly one and never recycle it.
        let pool_options = if is_in_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| {
                LedgerError::Configuration(format!("cannot open database '{}': {}", url, e))
            })?;

        let repository = Self { pool };
        repository.migrate().await?;
        info!("[rank-ledger] relational store at {}", url);
        Ok(repository)
    }

    /// Private in-memory database.
    pub async fn in_memory() -> LedgerResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Create missing tables and indexes.
    pub async fn migrate(&self) -> LedgerResult<()> {
        for statement in schema_statements(SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// The connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Rows of `user_ranks` in id order.
    pub async fn user_rank_rows(&self) -> LedgerResult<Vec<UserRankRow>> {
        Ok(sqlx::query_as(
            "SELECT id, minecraft_username, rank_id FROM user_ranks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Rows of `pending_purchases` in id order.
    pub async fn pending_purchase_rows(&self) -> LedgerResult<Vec<PendingPurchaseRow>> {
        Ok(sqlx::query_as(
            r#"
            SELECT id, session_id, rank_id, minecraft_username, user_id,
                   started_at_ms, started_at_text, is_gift, recipient
            FROM pending_purchases
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Rows of `minecraft_accounts` in id order.
    pub async fn minecraft_account_rows(&self) -> LedgerResult<Vec<MinecraftAccountRow>> {
        Ok(
            sqlx::query_as("SELECT id, user_id, username FROM minecraft_accounts ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

#[async_trait]
impl RankRepository for RelationalRankRepository {
    async fn load_ranks(&self, username: &Username) -> LedgerResult<Option<RankSet>> {
        let tokens: Vec<String> = sqlx::query_scalar(
            "SELECT rank_id FROM user_ranks WHERE minecraft_username = ? ORDER BY id",
        )
        .bind(username.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok((!tokens.is_empty()).then(|| RankSet::from_tokens(tokens)))
    }

    async fn store_ranks(&self, username: &Username, ranks: &RankSet) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_ranks WHERE minecraft_username = ?")
            .bind(username.as_str())
            .execute(&mut *tx)
            .await?;
        for rank in ranks {
            sqlx::query("INSERT INTO user_ranks (minecraft_username, rank_id) VALUES (?, ?)")
                .bind(username.as_str())
                .bind(rank.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(
            "[rank-ledger] user_ranks: replaced rows for {} ({} ranks)",
            username,
            ranks.len()
        );
        Ok(())
    }

    async fn load_all_ranks(&self) -> LedgerResult<Vec<(String, RankSet)>> {
        let mut grouped: BTreeMap<String, RankSet> = BTreeMap::new();
        for row in self.user_rank_rows().await? {
            grouped
                .entry(row.minecraft_username)
                .or_default()
                .push(RankId::parse(row.rank_id));
        }
        Ok(grouped.into_iter().collect())
    }

    async fn delete_ranks(&self, key: &str) -> LedgerResult<()> {
        let result = sqlx::query("DELETE FROM user_ranks WHERE minecraft_username = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        debug!(
            "[rank-ledger] user_ranks: deleted {} row(s) for {:?}",
            result.rows_affected(),
            key
        );
        Ok(())
    }

    async fn load_pending(&self) -> LedgerResult<Vec<PendingPurchase>> {
        self.pending_purchase_rows()
            .await?
            .into_iter()
            .map(PendingPurchaseRow::into_purchase)
            .collect()
    }

    async fn store_pending(&self, purchases: &[PendingPurchase]) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pending_purchases")
            .execute(&mut *tx)
            .await?;
        for purchase in purchases {
            let (started_at_ms, started_at_text) = match &purchase.timestamp {
                PurchaseTimestamp::EpochMillis(ms) => (Some(*ms), None),
                PurchaseTimestamp::Iso(text) => (None, Some(text.as_str())),
            };
            sqlx::query(
                r#"
                INSERT INTO pending_purchases
                    (session_id, rank_id, minecraft_username, user_id,
                     started_at_ms, started_at_text, is_gift, recipient)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(purchase.session_id.as_str())
            .bind(purchase.rank_id.to_string())
            .bind(purchase.minecraft_username.as_str())
            .bind(purchase.user_id.as_str())
            .bind(started_at_ms)
            .bind(started_at_text)
            .bind(purchase.is_gift)
            .bind(purchase.recipient.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("[rank-ledger] pending_purchases: {} rows", purchases.len());
        Ok(())
    }

    async fn load_linked_accounts(&self, user_id: &str) -> LedgerResult<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT username FROM minecraft_accounts WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn store_linked_accounts(&self, user_id: &str, accounts: &[String]) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM minecraft_accounts WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        for username in accounts {
            sqlx::query("INSERT INTO minecraft_accounts (user_id, username) VALUES (?, ?)")
                .bind(user_id)
                .bind(username.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repository() -> RelationalRankRepository {
        RelationalRankRepository::in_memory().await.unwrap()
    }

    #[test]
    fn test_schema_statements_skip_comments() {
        let statements = schema_statements(SCHEMA);
        assert_eq!(statements.len(), 5);
        assert!(statements.iter().all(|s| s.contains("CREATE")));
    }

    #[tokio::test]
    async fn test_store_ranks_replaces_rows() {
        let repo = repository().await;
        let steve = Username::normalize("steve");

        repo.store_ranks(&steve, &RankSet::from_tokens(["vip", "knight"]))
            .await
            .unwrap();
        repo.store_ranks(&steve, &RankSet::from_tokens(["mvp"]))
            .await
            .unwrap();

        let rows = repo.user_rank_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank_id, "mvp");
        assert_eq!(
            repo.load_ranks(&steve).await.unwrap(),
            Some(RankSet::from_tokens(["mvp"]))
        );
    }

    #[tokio::test]
    async fn test_rank_order_follows_row_ids() {
        let repo = repository().await;
        let alex = Username::normalize("alex");
        repo.store_ranks(&alex, &RankSet::from_tokens(["b", "a", "c"]))
            .await
            .unwrap();

        let rows = repo.user_rank_rows().await.unwrap();
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(
            repo.load_ranks(&alex).await.unwrap().unwrap().tokens(),
            vec!["b", "a", "c"]
        );
    }

    #[tokio::test]
    async fn test_other_users_untouched() {
        let repo = repository().await;
        let steve = Username::normalize("steve");
        let alex = Username::normalize("alex");
        repo.store_ranks(&alex, &RankSet::from_tokens(["vip"]))
            .await
            .unwrap();
        repo.store_ranks(&steve, &RankSet::from_tokens(["mvp"]))
            .await
            .unwrap();
        repo.store_ranks(&steve, &RankSet::new()).await.unwrap();

        let all = repo.load_all_ranks().await.unwrap();
        assert_eq!(all, vec![("alex".to_string(), RankSet::from_tokens(["vip"]))]);
    }

    #[tokio::test]
    async fn test_delete_ranks_matches_key_exactly() {
        let repo = repository().await;
        sqlx::query(
            "INSERT INTO user_ranks (minecraft_username, rank_id) VALUES ('Steve', 'vip'), ('steve', 'knight')",
        )
        .execute(repo.pool())
        .await
        .unwrap();

        repo.delete_ranks("Steve").await.unwrap();

        let all = repo.load_all_ranks().await.unwrap();
        assert_eq!(all, vec![("steve".to_string(), RankSet::from_tokens(["knight"]))]);
    }

    #[tokio::test]
    async fn test_pending_rows_round_trip() {
        let repo = repository().await;
        let purchases = vec![
            PendingPurchase::new("cs_1", "vip", "Steve", "u1")
                .at("2024-01-01T00:00:00Z".to_string())
                .gifted_to("Alex"),
            PendingPurchase::new("cs_2", "vip_to_mvp", "alex", "u2").at(5),
        ];
        repo.store_pending(&purchases).await.unwrap();

        let rows = repo.pending_purchase_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].started_at_text.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(rows[1].started_at_ms, Some(5));
        assert_eq!(repo.load_pending().await.unwrap(), purchases);
    }

    #[tokio::test]
    async fn test_linked_account_rows() {
        let repo = repository().await;
        repo.store_linked_accounts("u1", &["Steve".to_string(), "Alex".to_string()])
            .await
            .unwrap();
        repo.store_linked_accounts("u2", &["Notch".to_string()])
            .await
            .unwrap();

        assert_eq!(repo.minecraft_account_rows().await.unwrap().len(), 3);
        assert_eq!(
            repo.load_linked_accounts("u1").await.unwrap(),
            vec!["Steve", "Alex"]
        );
    }

    #[tokio::test]
    async fn test_database_file_outlives_pool() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ranks.db").display());
        let steve = Username::normalize("steve");

        let first = RelationalRankRepository::connect(&url).await.unwrap();
        first
            .store_ranks(&steve, &RankSet::from_tokens(["vip"]))
            .await
            .unwrap();
        first.pool().close().await;

        let second = RelationalRankRepository::connect(&url).await.unwrap();
        assert_eq!(
            second.load_ranks(&steve).await.unwrap(),
            Some(RankSet::from_tokens(["vip"]))
        );
    }

    #[tokio::test]
    async fn test_bad_url_is_configuration_error() {
        let err = RelationalRankRepository::connect("postgres://nowhere/db")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
    }
}
