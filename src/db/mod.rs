//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - The ledger store: repository operations for every entity
//! - Storage error classification

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, open_pool, DEFAULT_STORAGE_TIMEOUT};
pub use repo::{LedgerTotals, LoanCounts, LoanEvent, Repository};

use thiserror::Error;

/// Failure of a storage call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached or did not answer within the deadline.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A unique key (VIN, wallet address, email) is already taken.
    #[error("duplicate key: {0}")]
    Conflict(String),
    /// A stored row could not be decoded into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// The write would break a stored invariant, such as a counter going negative.
    #[error("rejected write: {0}")]
    Rejected(String),
    #[error(transparent)]
    Sql(sqlx::Error),
}

/// SQLite primary result codes for a database held by another connection.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Whether a driver error code (possibly extended) reports lock contention.
fn is_lock_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(ref db) if db.is_check_violation() => {
                StoreError::Rejected(db.message().to_string())
            }
            sqlx::Error::Database(ref db) if is_lock_contention(db.code().as_deref()) => {
                StoreError::Unavailable(db.message().to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Sql(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_extended_busy_codes_are_contention() {
        assert!(is_lock_contention(Some("5")));
        // SQLITE_BUSY_SNAPSHOT
        assert!(is_lock_contention(Some("517")));
        // SQLITE_CONSTRAINT_CHECK
        assert!(!is_lock_contention(Some("275")));
        assert!(!is_lock_contention(None));
    }

    #[test]
    fn test_row_not_found_is_passed_through() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Sql(sqlx::Error::RowNotFound)));
    }
}
