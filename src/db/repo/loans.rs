//! Loan operations, including the compare-and-set loan event commit.

use crate::db::StoreError;
use crate::domain::{
    DealerDelta, Decimal, Loan, LoanFilter, LoanStatus, Notification, TimeMs, Transaction,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use super::dealers::apply_delta_on;
use super::ledger::insert_transaction_on;
use super::notifications::insert_notification_on;
use super::{get_money, get_opt_money, get_opt_time, get_time, get_variant, minor, Repository};

const LOAN_COLUMNS: &str = r#"
    id, dealer_id, amount_minor, currency, interest_rate, flat_fee_minor, term_months,
    status, remaining_balance_minor, vehicles_financed, start_date, next_payment_due,
    next_payment_amount_minor, paid_off_date, version, created_at, updated_at
"#;

fn loan_from_row(row: &SqliteRow) -> Result<Loan, StoreError> {
    let rate: String = row.try_get("interest_rate")?;
    let term: i64 = row.try_get("term_months")?;
    let vehicles: i64 = row.try_get("vehicles_financed")?;
    Ok(Loan {
        id: row.try_get("id")?,
        dealer_id: row.try_get("dealer_id")?,
        amount: get_money(row, "amount_minor")?,
        currency: row.try_get("currency")?,
        interest_rate: Decimal::from_str(&rate)
            .map_err(|e| StoreError::Corrupt(format!("interest_rate {:?}: {}", rate, e)))?,
        flat_fee: get_money(row, "flat_fee_minor")?,
        term_months: u32::try_from(term)
            .map_err(|_| StoreError::Corrupt(format!("term_months {}", term)))?,
        status: get_variant(row, "status")?,
        remaining_balance: get_money(row, "remaining_balance_minor")?,
        vehicles_financed: u32::try_from(vehicles)
            .map_err(|_| StoreError::Corrupt(format!("vehicles_financed {}", vehicles)))?,
        start_date: get_opt_time(row, "start_date")?,
        next_payment_due: get_opt_time(row, "next_payment_due")?,
        next_payment_amount: get_opt_money(row, "next_payment_amount_minor")?,
        paid_off_date: get_opt_time(row, "paid_off_date")?,
        version: row.try_get("version")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

/// Per-dealer loan counts by lifecycle stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanCounts {
    /// Loans that have left `pending`.
    pub approved: i64,
    /// Loans that are `active` or `overdue`.
    pub outstanding: i64,
}

/// One loan transition and its consequences, committed as a unit.
///
/// The loan row is written only if its stored version still equals
/// `expected_version`; the transaction, dealer adjustment and notification are
/// written only after that update succeeds.
#[derive(Debug)]
pub struct LoanEvent<'a> {
    pub expected_version: i64,
    /// The loan's next state.
    pub loan: &'a Loan,
    pub transaction: Option<&'a Transaction>,
    pub dealer_delta: Option<DealerDelta>,
    pub notification: Option<&'a Notification>,
}

impl Repository {
    /// Insert a new loan.
    pub async fn insert_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        self.bounded("insert_loan", async {
            sqlx::query(
                r#"
                INSERT INTO loans (
                    id, dealer_id, amount_minor, currency, interest_rate, flat_fee_minor,
                    term_months, status, remaining_balance_minor, vehicles_financed,
                    start_date, next_payment_due, next_payment_amount_minor, paid_off_date,
                    version, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&loan.id)
            .bind(&loan.dealer_id)
            .bind(minor(loan.amount)?)
            .bind(&loan.currency)
            .bind(loan.interest_rate.to_canonical_string())
            .bind(minor(loan.flat_fee)?)
            .bind(i64::from(loan.term_months))
            .bind(loan.status.as_str())
            .bind(minor(loan.remaining_balance)?)
            .bind(i64::from(loan.vehicles_financed))
            .bind(loan.start_date.map(|t| t.as_ms()))
            .bind(loan.next_payment_due.map(|t| t.as_ms()))
            .bind(loan.next_payment_amount.map(minor).transpose()?)
            .bind(loan.paid_off_date.map(|t| t.as_ms()))
            .bind(loan.version)
            .bind(loan.created_at.as_ms())
            .bind(loan.updated_at.as_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Get a loan by id.
    pub async fn get_loan(&self, loan_id: &str) -> Result<Option<Loan>, StoreError> {
        self.bounded("get_loan", async {
            let sql = format!("SELECT {} FROM loans WHERE id = ?", LOAN_COLUMNS);
            let row = sqlx::query(&sql)
                .bind(loan_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(loan_from_row).transpose()
        })
        .await
    }

    /// Query loans by optional dealer and status, newest first.
    pub async fn find_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>, StoreError> {
        self.bounded("find_loans", async {
            let sql = format!(
                r#"
                SELECT {}
                FROM loans
                WHERE (? IS NULL OR dealer_id = ?) AND (? IS NULL OR status = ?)
                ORDER BY created_at DESC, id ASC
                "#,
                LOAN_COLUMNS
            );
            let status = filter.status.map(|s| s.as_str());
            let rows = sqlx::query(&sql)
                .bind(filter.dealer_id.as_deref())
                .bind(filter.dealer_id.as_deref())
                .bind(status)
                .bind(status)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(loan_from_row).collect()
        })
        .await
    }

    /// Active loans whose next payment was due strictly before `as_of`.
    pub async fn find_loans_past_due(&self, as_of: TimeMs) -> Result<Vec<Loan>, StoreError> {
        self.bounded("find_loans_past_due", async {
            let sql = format!(
                r#"
                SELECT {}
                FROM loans
                WHERE status = ? AND next_payment_due IS NOT NULL AND next_payment_due < ?
                ORDER BY next_payment_due ASC, id ASC
                "#,
                LOAN_COLUMNS
            );
            let rows = sqlx::query(&sql)
                .bind(LoanStatus::Active.as_str())
                .bind(as_of.as_ms())
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(loan_from_row).collect()
        })
        .await
    }

    /// Commit a loan transition with its ledger consequences.
    ///
    /// Returns `Ok(false)` and writes nothing when the loan's version moved
    /// since it was read. A missing dealer for `dealer_delta` rolls the whole
    /// event back and is reported as `StoreError::Corrupt`, since loans always
    /// reference an existing dealer.
    pub async fn commit_loan_event(&self, event: &LoanEvent<'_>) -> Result<bool, StoreError> {
        self.bounded("commit_loan_event", async {
            let loan = event.loan;
            let mut tx = self.pool.begin().await?;

            let updated = sqlx::query(
                r#"
                UPDATE loans SET
                    status = ?,
                    remaining_balance_minor = ?,
                    start_date = ?,
                    next_payment_due = ?,
                    next_payment_amount_minor = ?,
                    paid_off_date = ?,
                    version = version + 1,
                    updated_at = ?
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(loan.status.as_str())
            .bind(minor(loan.remaining_balance)?)
            .bind(loan.start_date.map(|t| t.as_ms()))
            .bind(loan.next_payment_due.map(|t| t.as_ms()))
            .bind(loan.next_payment_amount.map(minor).transpose()?)
            .bind(loan.paid_off_date.map(|t| t.as_ms()))
            .bind(loan.updated_at.as_ms())
            .bind(&loan.id)
            .bind(event.expected_version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }

            if let Some(transaction) = event.transaction {
                insert_transaction_on(&mut *tx, transaction).await?;
            }

            if let Some(delta) = event.dealer_delta.filter(|d| !d.is_noop()) {
                if !apply_delta_on(&mut *tx, &loan.dealer_id, &delta, loan.updated_at).await? {
                    tx.rollback().await?;
                    return Err(StoreError::Corrupt(format!(
                        "loan {} references missing dealer {}",
                        loan.id, loan.dealer_id
                    )));
                }
            }

            if let Some(notification) = event.notification {
                insert_notification_on(&mut *tx, notification).await?;
            }

            tx.commit().await?;
            Ok(true)
        })
        .await
    }

    /// Count a dealer's approved loans and those still outstanding.
    pub async fn loan_counts(&self, dealer_id: &str) -> Result<LoanCounts, StoreError> {
        self.bounded("loan_counts", async {
            let row = sqlx::query(
                r#"
                SELECT
                    COALESCE(SUM(CASE WHEN status <> ? THEN 1 ELSE 0 END), 0) AS approved,
                    COALESCE(SUM(CASE WHEN status IN (?, ?) THEN 1 ELSE 0 END), 0) AS outstanding
                FROM loans
                WHERE dealer_id = ?
                "#,
            )
            .bind(LoanStatus::Pending.as_str())
            .bind(LoanStatus::Active.as_str())
            .bind(LoanStatus::Overdue.as_str())
            .bind(dealer_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(LoanCounts {
                approved: row.try_get("approved")?,
                outstanding: row.try_get("outstanding")?,
            })
        })
        .await
    }
}
