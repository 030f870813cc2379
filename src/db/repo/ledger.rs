//! Append-only facts: transactions and audits.
//!
//! Transactions are never updated or deleted. Audits change only through
//! resolution.

use crate::db::StoreError;
use crate::domain::{
    Audit, AuditFilter, AuditStatus, DealerDelta, Decimal, Notification, TimeMs, Transaction,
    TransactionFilter, TransactionType, Vin,
};
use rust_decimal::prelude::ToPrimitive;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::dealers::apply_delta_on;
use super::notifications::insert_notification_on;
use super::{get_flag, get_money, get_time, get_variant, minor, Repository};

const TRANSACTION_COLUMNS: &str = r#"
    id, dealer_id, tx_type, amount_minor, currency, loan_id, method, tx_hash, status, timestamp
"#;

const AUDIT_COLUMNS: &str = r#"
    id, vehicle_id, vin, dealer_id, lat, lng, timestamp, status, auditor_wallet,
    nfc_tag_scanned, notes
"#;

/// Upper bound applied when a filter carries no explicit limit.
const UNBOUNDED: i64 = -1;

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        id: row.try_get("id")?,
        dealer_id: row.try_get("dealer_id")?,
        tx_type: get_variant(row, "tx_type")?,
        amount: get_money(row, "amount_minor")?,
        currency: row.try_get("currency")?,
        loan_id: row.try_get("loan_id")?,
        method: row.try_get("method")?,
        tx_hash: row.try_get("tx_hash")?,
        status: get_variant(row, "status")?,
        timestamp: get_time(row, "timestamp")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<Audit, StoreError> {
    let vin: String = row.try_get("vin")?;
    Ok(Audit {
        id: row.try_get("id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        vin: vin
            .parse::<Vin>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        dealer_id: row.try_get("dealer_id")?,
        location: crate::domain::GeoPoint {
            lat: row.try_get("lat")?,
            lng: row.try_get("lng")?,
        },
        timestamp: get_time(row, "timestamp")?,
        status: get_variant(row, "status")?,
        auditor_wallet: row.try_get("auditor_wallet")?,
        nfc_tag_scanned: get_flag(row, "nfc_tag_scanned")?,
        notes: row.try_get("notes")?,
    })
}

pub(super) async fn insert_transaction_on(
    conn: &mut SqliteConnection,
    tx: &Transaction,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, dealer_id, tx_type, amount_minor, currency, loan_id, method, tx_hash,
            status, timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&tx.id)
    .bind(&tx.dealer_id)
    .bind(tx.tx_type.as_str())
    .bind(minor(tx.amount)?)
    .bind(&tx.currency)
    .bind(tx.loan_id.as_deref())
    .bind(tx.method.as_deref())
    .bind(tx.tx_hash.as_deref())
    .bind(tx.status.as_str())
    .bind(tx.timestamp.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Per-dealer sums recomputed from the transaction ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerTotals {
    pub disbursed: Decimal,
    pub repaid: Decimal,
    pub reward_tokens: i64,
}

impl Repository {
    /// Append a standalone transaction.
    pub async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.bounded("insert_transaction", async {
            let mut conn = self.pool.acquire().await?;
            insert_transaction_on(&mut *conn, tx).await
        })
        .await
    }

    /// Get a transaction by id.
    pub async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>, StoreError> {
        self.bounded("get_transaction", async {
            let sql = format!(
                "SELECT {} FROM transactions WHERE id = ?",
                TRANSACTION_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(tx_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(transaction_from_row).transpose()
        })
        .await
    }

    /// Query transactions, newest first.
    pub async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.bounded("find_transactions", async {
            let sql = format!(
                r#"
                SELECT {}
                FROM transactions
                WHERE (? IS NULL OR dealer_id = ?)
                  AND (? IS NULL OR loan_id = ?)
                  AND (? IS NULL OR tx_type = ?)
                  AND (? IS NULL OR timestamp >= ?)
                ORDER BY timestamp DESC, id ASC
                LIMIT ?
                "#,
                TRANSACTION_COLUMNS
            );
            let tx_type = filter.tx_type.map(|t| t.as_str());
            let since = filter.since.map(|t| t.as_ms());
            let rows = sqlx::query(&sql)
                .bind(filter.dealer_id.as_deref())
                .bind(filter.dealer_id.as_deref())
                .bind(filter.loan_id.as_deref())
                .bind(filter.loan_id.as_deref())
                .bind(tx_type)
                .bind(tx_type)
                .bind(since)
                .bind(since)
                .bind(filter.limit.unwrap_or(UNBOUNDED))
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(transaction_from_row).collect()
        })
        .await
    }

    /// Sum a dealer's disbursements, payments and rewards straight from the ledger.
    pub async fn ledger_totals(&self, dealer_id: &str) -> Result<LedgerTotals, StoreError> {
        self.bounded("ledger_totals", async {
            let row = sqlx::query(
                r#"
                SELECT
                    COALESCE(SUM(CASE WHEN tx_type = ? THEN amount_minor END), 0) AS disbursed,
                    COALESCE(SUM(CASE WHEN tx_type = ? THEN amount_minor END), 0) AS repaid,
                    COALESCE(SUM(CASE WHEN tx_type = ? THEN amount_minor END), 0) AS rewards
                FROM transactions
                WHERE dealer_id = ?
                "#,
            )
            .bind(TransactionType::LoanDisbursement.as_str())
            .bind(TransactionType::Payment.as_str())
            .bind(TransactionType::AnvlReward.as_str())
            .bind(dealer_id)
            .fetch_one(&self.pool)
            .await?;

            // Reward amounts are whole tokens stored as minor units.
            let rewards = Decimal::from_minor(row.try_get::<i64, _>("rewards")?);
            Ok(LedgerTotals {
                disbursed: Decimal::from_minor(row.try_get::<i64, _>("disbursed")?),
                repaid: Decimal::from_minor(row.try_get::<i64, _>("repaid")?),
                reward_tokens: rewards.inner().trunc().to_i64().ok_or_else(|| {
                    StoreError::Corrupt(format!("reward total {} out of range", rewards))
                })?,
            })
        })
        .await
    }

    /// Record a token reward and credit the dealer's balance as one unit.
    ///
    /// Returns false, writing nothing, when the dealer does not exist.
    pub async fn commit_reward(&self, tx: &Transaction, tokens: i64) -> Result<bool, StoreError> {
        self.bounded("commit_reward", async {
            let mut db_tx = self.pool.begin().await?;
            let delta = DealerDelta::reward_tokens(tokens);
            if !apply_delta_on(&mut *db_tx, &tx.dealer_id, &delta, tx.timestamp).await? {
                db_tx.rollback().await?;
                return Ok(false);
            }
            insert_transaction_on(&mut *db_tx, tx).await?;
            db_tx.commit().await?;
            Ok(true)
        })
        .await
    }

    /// Store an audit and stamp the vehicle's last audit time and position,
    /// together with an optional alert, as one unit.
    ///
    /// Returns false, writing nothing, when the vehicle no longer exists.
    pub async fn commit_audit(
        &self,
        audit: &Audit,
        notification: Option<&Notification>,
    ) -> Result<bool, StoreError> {
        self.bounded("commit_audit", async {
            let mut db_tx = self.pool.begin().await?;

            let stamped = sqlx::query(
                r#"
                UPDATE vehicles SET last_audit = ?, gps_lat = ?, gps_lng = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(audit.timestamp.as_ms())
            .bind(audit.location.lat)
            .bind(audit.location.lng)
            .bind(audit.timestamp.as_ms())
            .bind(&audit.vehicle_id)
            .execute(&mut *db_tx)
            .await?;

            if stamped.rows_affected() == 0 {
                db_tx.rollback().await?;
                return Ok(false);
            }

            sqlx::query(
                r#"
                INSERT INTO audits (
                    id, vehicle_id, vin, dealer_id, lat, lng, timestamp, status,
                    auditor_wallet, nfc_tag_scanned, notes
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&audit.id)
            .bind(&audit.vehicle_id)
            .bind(audit.vin.as_str())
            .bind(&audit.dealer_id)
            .bind(audit.location.lat)
            .bind(audit.location.lng)
            .bind(audit.timestamp.as_ms())
            .bind(audit.status.as_str())
            .bind(&audit.auditor_wallet)
            .bind(audit.nfc_tag_scanned)
            .bind(&audit.notes)
            .execute(&mut *db_tx)
            .await?;

            if let Some(notification) = notification {
                insert_notification_on(&mut *db_tx, notification).await?;
            }

            db_tx.commit().await?;
            Ok(true)
        })
        .await
    }

    /// Get an audit by id.
    pub async fn get_audit(&self, audit_id: &str) -> Result<Option<Audit>, StoreError> {
        self.bounded("get_audit", async {
            let sql = format!("SELECT {} FROM audits WHERE id = ?", AUDIT_COLUMNS);
            let row = sqlx::query(&sql)
                .bind(audit_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(audit_from_row).transpose()
        })
        .await
    }

    /// Query audits, newest first.
    pub async fn find_audits(&self, filter: &AuditFilter) -> Result<Vec<Audit>, StoreError> {
        self.bounded("find_audits", async {
            let sql = format!(
                r#"
                SELECT {}
                FROM audits
                WHERE (? IS NULL OR dealer_id = ?)
                  AND (? IS NULL OR vehicle_id = ?)
                  AND (? IS NULL OR status = ?)
                  AND (? IS NULL OR timestamp >= ?)
                ORDER BY timestamp DESC, id ASC
                LIMIT ?
                "#,
                AUDIT_COLUMNS
            );
            let status = filter.status.map(|s| s.as_str());
            let since = filter.since.map(|t| t.as_ms());
            let rows = sqlx::query(&sql)
                .bind(filter.dealer_id.as_deref())
                .bind(filter.dealer_id.as_deref())
                .bind(filter.vehicle_id.as_deref())
                .bind(filter.vehicle_id.as_deref())
                .bind(status)
                .bind(status)
                .bind(since)
                .bind(since)
                .bind(filter.limit.unwrap_or(UNBOUNDED))
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(audit_from_row).collect()
        })
        .await
    }

    /// Mark an audit compliant with the given notes.
    ///
    /// Returns false when no audit has the given id.
    pub async fn resolve_audit(&self, audit_id: &str, notes: &str) -> Result<bool, StoreError> {
        self.bounded("resolve_audit", async {
            let result = sqlx::query("UPDATE audits SET status = ?, notes = ? WHERE id = ?")
                .bind(AuditStatus::Compliant.as_str())
                .bind(notes)
                .bind(audit_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Audit counts by status for a dealer since the given time.
    pub async fn count_audits_by_status(
        &self,
        dealer_id: &str,
        since: TimeMs,
    ) -> Result<Vec<(AuditStatus, i64)>, StoreError> {
        self.bounded("count_audits_by_status", async {
            let rows = sqlx::query(
                r#"
                SELECT status, COUNT(*) AS n
                FROM audits
                WHERE dealer_id = ? AND timestamp >= ?
                GROUP BY status
                "#,
            )
            .bind(dealer_id)
            .bind(since.as_ms())
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|row| Ok((get_variant(row, "status")?, row.try_get::<i64, _>("n")?)))
                .collect()
        })
        .await
    }
}
