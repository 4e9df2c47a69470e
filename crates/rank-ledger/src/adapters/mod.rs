//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound storage ports.
//!
//! ```text
//! DocumentStore ──► InMemoryDocumentStore | FileDocumentStore
//!       │
//!       ▼
//! RankRepository ◄── DocumentRankRepository | RelationalRankRepository (SQLite)
//! ```

mod document;
#[cfg(any(test, feature = "test-utils"))]
mod fault;
mod file;
mod memory;
mod relational;

pub use document::{
    DocumentRankRepository, MINECRAFT_ACCOUNTS_KEY, PENDING_PURCHASES_KEY, USER_DATA_KEY,
};
#[cfg(any(test, feature = "test-utils"))]
pub use fault::FaultInjectingRepository;
pub use file::FileDocumentStore;
pub use memory::InMemoryDocumentStore;
pub use relational::{
    MinecraftAccountRow, PendingPurchaseRow, RelationalRankRepository, RowId, UserRankRow,
};

use std::sync::Arc;
use tracing::info;

use crate::config::{LedgerConfig, StorageBackend};
use crate::domain::{LedgerError, LedgerResult};
use crate::ports::outbound::RankRepository;

/// Build the repository selected by `config`.
pub async fn build_repository(config: &LedgerConfig) -> LedgerResult<Arc<dyn RankRepository>> {
    config.validate()?;

    let repository: Arc<dyn RankRepository> = match config.backend {
        StorageBackend::Memory => Arc::new(DocumentRankRepository::new(
            InMemoryDocumentStore::new(),
        )),
        StorageBackend::File => {
            let dir = config.data_dir.as_ref().ok_or_else(|| {
                LedgerError::Configuration("file backend requires a data directory".to_string())
            })?;
            Arc::new(DocumentRankRepository::new(FileDocumentStore::open(dir)?))
        }
        StorageBackend::Relational => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                LedgerError::Configuration(
                    "relational backend requires a database url".to_string(),
                )
            })?;
            Arc::new(RelationalRankRepository::connect(url).await?)
        }
    };

    info!("[rank-ledger] using {} backend", config.backend);
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RankSet, Username};

    #[tokio::test]
    async fn test_build_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        let configs = [
            LedgerConfig::for_testing(),
            LedgerConfig::file_backed(dir.path()),
            LedgerConfig::relational("sqlite::memory:"),
        ];

        for config in configs {
            let repo = build_repository(&config).await.unwrap();
            let steve = Username::normalize("steve");
            repo.store_ranks(&steve, &RankSet::from_tokens(["vip"]))
                .await
                .unwrap();
            assert_eq!(
                repo.load_ranks(&steve).await.unwrap(),
                Some(RankSet::from_tokens(["vip"])),
                "{}",
                config.backend
            );
        }
    }

    #[tokio::test]
    async fn test_file_backend_without_dir() {
        let config = LedgerConfig {
            backend: StorageBackend::File,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            build_repository(&config).await,
            Err(LedgerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_relational_backend_without_url() {
        let config = LedgerConfig {
            backend: StorageBackend::Relational,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            build_repository(&config).await,
            Err(LedgerError::Configuration(_))
        ));
    }
}
