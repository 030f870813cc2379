//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct, the explicit persistence
//! context shared by every engine. Methods are organized across submodules by
//! entity:
//! - `dealers.rs` - Dealer profiles and atomic total increments
//! - `loans.rs` - Loans and the compare-and-set loan event commit
//! - `vehicles.rs` - Vehicle inventory
//! - `ledger.rs` - Transactions and audits (append-only facts)
//! - `notifications.rs` - Notification listing and read flags
//!
//! Every call runs under the storage deadline and surfaces expiry as
//! `StoreError::Unavailable`.

mod dealers;
mod ledger;
mod loans;
mod notifications;
mod vehicles;

pub use ledger::LedgerTotals;
pub use loans::{LoanCounts, LoanEvent};

use crate::db::migrations::DEFAULT_STORAGE_TIMEOUT;
use crate::db::StoreError;
use crate::domain::{Decimal, GeoPoint, TimeMs, UnknownVariant};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
    timeout: Duration,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository {
            pool,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    /// Override the per-call storage deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Round-trip a trivial query, for readiness probes.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    /// Close the underlying pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run a storage call under the configured deadline.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Err(StoreError::Unavailable(msg))) => {
                warn!(op, error = %msg, "Storage unavailable");
                Err(StoreError::Unavailable(msg))
            }
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(op, timeout_ms, "Storage call timed out");
                Err(StoreError::Unavailable(format!(
                    "{} did not complete within {}ms",
                    op,
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

fn parse_variant<T>(raw: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn get_variant<T>(row: &SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    parse_variant(&raw)
}

fn get_money(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    Ok(Decimal::from_minor(row.try_get::<i64, _>(column)?))
}

fn get_opt_money(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StoreError> {
    Ok(row
        .try_get::<Option<i64>, _>(column)?
        .map(Decimal::from_minor))
}

fn get_time(row: &SqliteRow, column: &str) -> Result<TimeMs, StoreError> {
    Ok(TimeMs::new(row.try_get::<i64, _>(column)?))
}

fn get_opt_time(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, StoreError> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(TimeMs::new))
}

fn get_opt_point(
    row: &SqliteRow,
    lat_column: &str,
    lng_column: &str,
) -> Result<Option<GeoPoint>, StoreError> {
    let lat: Option<f64> = row.try_get(lat_column)?;
    let lng: Option<f64> = row.try_get(lng_column)?;
    Ok(match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    })
}

fn get_flag(row: &SqliteRow, column: &str) -> Result<bool, StoreError> {
    Ok(row.try_get::<i64, _>(column)? != 0)
}

/// Integer minor units for binding; amounts beyond i64 cents cannot be stored.
fn minor(amount: Decimal) -> Result<i64, StoreError> {
    amount
        .to_minor()
        .ok_or_else(|| StoreError::Corrupt(format!("amount {} out of range", amount)))
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_test_db;
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out_as_unavailable() {
        let (repo, _temp) = setup_test_db().await;
        let repo = repo.with_timeout(Duration::from_millis(10));

        let result: Result<(), StoreError> = repo
            .bounded("slow_call", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_parse_variant_rejects_unknown() {
        let result: Result<crate::domain::LoanStatus, _> = parse_variant("closed");
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
