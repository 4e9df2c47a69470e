//! # Rank Ledger Configuration
//!
//! Backend selection and limits, loadable from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::LedgerError;

/// Default cap on linked Minecraft accounts per site user.
pub const DEFAULT_MAX_LINKED_ACCOUNTS: usize = 5;

/// Does this SQLite URL name an in-memory database?
pub(crate) fn is_in_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Which persistence backend to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Document store held in process memory.
    #[default]
    Memory,
    /// Document store persisted as one JSON file per key.
    File,
    /// Row-per-record SQLite tables.
    Relational,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Relational => "relational",
        };
        f.write_str(name)
    }
}

impl FromStr for StorageBackend {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            "relational" | "rows" => Ok(Self::Relational),
            other => Err(LedgerError::Configuration(format!(
                "unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Rank ledger configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Persistence backend.
    pub backend: StorageBackend,

    /// Directory for the file backend. Required when `backend` is `File`.
    pub data_dir: Option<PathBuf>,

    /// SQLite connection URL. Required when `backend` is `Relational`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Linked accounts kept per site user; the oldest is evicted past this.
    pub max_linked_accounts: usize,

    /// `tracing` filter directive used by binaries.
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: None,
            database_url: None,
            max_linked_accounts: DEFAULT_MAX_LINKED_ACCOUNTS,
            log_filter: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Create a config for testing.
    pub fn for_testing() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: None,
            database_url: None,
            max_linked_accounts: 3,
            log_filter: "debug".to_string(),
        }
    }

    /// File backend rooted at `dir`.
    pub fn file_backed(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Relational backend at `url`.
    pub fn relational(url: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Relational,
            database_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Is the selected backend gone when the process exits?
    pub fn is_ephemeral(&self) -> bool {
        match self.backend {
            StorageBackend::Memory => true,
            StorageBackend::File => false,
            StorageBackend::Relational => self
                .database_url
                .as_deref()
                .map_or(true, is_in_memory_url),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RANK_LEDGER_BACKEND`: memory | file | relational (default: memory)
    /// - `RANK_LEDGER_DATA_DIR`: directory for the file backend
    /// - `RANK_LEDGER_DATABASE_URL`: SQLite URL for the relational backend
    /// - `RANK_LEDGER_MAX_LINKED_ACCOUNTS`: linked account cap (default: 5)
    /// - `RANK_LEDGER_LOG` or `RUST_LOG`: log filter (default: info)
    pub fn from_env() -> Result<Self, LedgerError> {
        let defaults = Self::default();

        let backend = match env::var("RANK_LEDGER_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };

        let max_linked_accounts = match env::var("RANK_LEDGER_MAX_LINKED_ACCOUNTS") {
            Ok(value) => value.trim().parse().map_err(|e| {
                LedgerError::Configuration(format!(
                    "RANK_LEDGER_MAX_LINKED_ACCOUNTS='{}': {}",
                    value, e
                ))
            })?,
            Err(_) => defaults.max_linked_accounts,
        };

        let config = Self {
            backend,
            data_dir: env::var("RANK_LEDGER_DATA_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            database_url: env::var("RANK_LEDGER_DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_linked_accounts,
            log_filter: env::var("RANK_LEDGER_LOG")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_filter),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no backend can run with.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.backend == StorageBackend::File && self.data_dir.is_none() {
            return Err(LedgerError::Configuration(
                "file backend requires a data directory (RANK_LEDGER_DATA_DIR)".to_string(),
            ));
        }
        if self.backend == StorageBackend::Relational && self.database_url.is_none() {
            return Err(LedgerError::Configuration(
                "relational backend requires a database url (RANK_LEDGER_DATABASE_URL)"
                    .to_string(),
            ));
        }
        if self.max_linked_accounts == 0 {
            return Err(LedgerError::Configuration(
                "max_linked_accounts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
