//! # Domain Errors
//!
//! Error types for the rank ledger.
//!
//! Getters on the store adapter never surface these; they log and fall back
//! to an empty value. Mutations, sweeps and repairs carry them upward.
//! An absent record is `None`, never an error.

use thiserror::Error;

/// Rank ledger error types.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Backend unreachable or misconfigured (missing data dir, bad cap).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied unusable input (empty criteria, blank username).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored value exists but cannot be decoded.
    #[error("Corrupt data under '{key}': {reason}")]
    Corrupt {
        /// Logical key or table name.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Configuration(e.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Result alias used across the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let err = LedgerError::Configuration("missing data dir".to_string());
        assert!(err.to_string().contains("missing data dir"));
    }

    #[test]
    fn test_corrupt_error_names_key() {
        let err = LedgerError::Corrupt {
            key: "pending-purchases".to_string(),
            reason: "expected array".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pending-purchases"));
        assert!(msg.contains("expected array"));
    }

    #[test]
    fn test_sqlx_errors_map_by_kind() {
        let err: LedgerError = sqlx::Error::Configuration("bad url".into()).into();
        assert!(matches!(err, LedgerError::Configuration(_)));
        let err: LedgerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LedgerError = io.into();
        assert!(matches!(err, LedgerError::Storage(_)));
    }
}
