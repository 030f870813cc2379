//! Dealer profile operations and atomic running-total increments.

use crate::db::StoreError;
use crate::domain::{Dealer, DealerDelta, DealerPatch, TimeMs, WalletAddress};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{get_flag, get_money, get_opt_point, get_time, get_variant, minor, Repository};

const DEALER_COLUMNS: &str = r#"
    id, wallet_address, name, address, phone, email, ach_connected, kyc_status,
    lot_lat, lot_lng, anvl_tokens, total_loaned_minor, total_repaid_minor,
    active_loans, created_at, updated_at
"#;

fn dealer_from_row(row: &SqliteRow) -> Result<Dealer, StoreError> {
    let wallet: String = row.try_get("wallet_address")?;
    Ok(Dealer {
        id: row.try_get("id")?,
        wallet_address: wallet
            .parse::<WalletAddress>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        ach_connected: get_flag(row, "ach_connected")?,
        kyc_status: get_variant(row, "kyc_status")?,
        lot_location: get_opt_point(row, "lot_lat", "lot_lng")?,
        anvl_tokens: row.try_get("anvl_tokens")?,
        total_loaned: get_money(row, "total_loaned_minor")?,
        total_repaid: get_money(row, "total_repaid_minor")?,
        active_loans: row.try_get("active_loans")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

/// Apply a total adjustment on an open connection or transaction.
///
/// Returns false when no dealer has the given id.
pub(super) async fn apply_delta_on(
    conn: &mut SqliteConnection,
    dealer_id: &str,
    delta: &DealerDelta,
    now: TimeMs,
) -> Result<bool, StoreError> {
    if !delta.is_monotonic() {
        return Err(StoreError::Rejected(format!(
            "dealer totals cannot decrease: {:?}",
            delta
        )));
    }
    let result = sqlx::query(
        r#"
        UPDATE dealers SET
            total_loaned_minor = total_loaned_minor + ?,
            total_repaid_minor = total_repaid_minor + ?,
            active_loans = active_loans + ?,
            anvl_tokens = anvl_tokens + ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(minor(delta.loaned)?)
    .bind(minor(delta.repaid)?)
    .bind(delta.active_loans)
    .bind(delta.reward_tokens)
    .bind(now.as_ms())
    .bind(dealer_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

impl Repository {
    /// Insert a new dealer.
    ///
    /// # Errors
    /// `StoreError::Conflict` if the wallet address or email is already registered.
    pub async fn insert_dealer(&self, dealer: &Dealer) -> Result<(), StoreError> {
        self.bounded("insert_dealer", async {
            sqlx::query(
                r#"
                INSERT INTO dealers (
                    id, wallet_address, name, address, phone, email, ach_connected,
                    kyc_status, lot_lat, lot_lng, anvl_tokens, total_loaned_minor,
                    total_repaid_minor, active_loans, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&dealer.id)
            .bind(dealer.wallet_address.as_str())
            .bind(&dealer.name)
            .bind(&dealer.address)
            .bind(&dealer.phone)
            .bind(&dealer.email)
            .bind(dealer.ach_connected)
            .bind(dealer.kyc_status.as_str())
            .bind(dealer.lot_location.map(|p| p.lat))
            .bind(dealer.lot_location.map(|p| p.lng))
            .bind(dealer.anvl_tokens)
            .bind(minor(dealer.total_loaned)?)
            .bind(minor(dealer.total_repaid)?)
            .bind(dealer.active_loans)
            .bind(dealer.created_at.as_ms())
            .bind(dealer.updated_at.as_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Get a dealer by id.
    pub async fn get_dealer(&self, dealer_id: &str) -> Result<Option<Dealer>, StoreError> {
        self.bounded("get_dealer", async {
            let sql = format!("SELECT {} FROM dealers WHERE id = ?", DEALER_COLUMNS);
            let row = sqlx::query(&sql)
                .bind(dealer_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(dealer_from_row).transpose()
        })
        .await
    }

    /// Get a dealer by wallet address.
    pub async fn get_dealer_by_wallet(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<Dealer>, StoreError> {
        self.bounded("get_dealer_by_wallet", async {
            let sql = format!(
                "SELECT {} FROM dealers WHERE wallet_address = ?",
                DEALER_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(wallet.as_str())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(dealer_from_row).transpose()
        })
        .await
    }

    /// Whether a dealer with the given id exists.
    pub async fn dealer_exists(&self, dealer_id: &str) -> Result<bool, StoreError> {
        self.bounded("dealer_exists", async {
            let row = sqlx::query("SELECT 1 FROM dealers WHERE id = ?")
                .bind(dealer_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.is_some())
        })
        .await
    }

    /// Refresh `updated_at` (wallet reconnection).
    pub async fn touch_dealer(&self, dealer_id: &str, now: TimeMs) -> Result<bool, StoreError> {
        self.bounded("touch_dealer", async {
            let result = sqlx::query("UPDATE dealers SET updated_at = ? WHERE id = ?")
                .bind(now.as_ms())
                .bind(dealer_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Apply a profile patch in one statement. Absent fields keep their value.
    ///
    /// Returns false when no dealer has the given id.
    pub async fn update_dealer(
        &self,
        dealer_id: &str,
        patch: &DealerPatch,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        self.bounded("update_dealer", async {
            let result = sqlx::query(
                r#"
                UPDATE dealers SET
                    name = COALESCE(?, name),
                    address = COALESCE(?, address),
                    phone = COALESCE(?, phone),
                    email = COALESCE(?, email),
                    ach_connected = COALESCE(?, ach_connected),
                    kyc_status = COALESCE(?, kyc_status),
                    lot_lat = COALESCE(?, lot_lat),
                    lot_lng = COALESCE(?, lot_lng),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(patch.name.as_deref())
            .bind(patch.address.as_deref())
            .bind(patch.phone.as_deref())
            .bind(patch.email.as_deref())
            .bind(patch.ach_connected)
            .bind(patch.kyc_status.map(|s| s.as_str()))
            .bind(patch.lot_location.map(|p| p.lat))
            .bind(patch.lot_location.map(|p| p.lng))
            .bind(now.as_ms())
            .bind(dealer_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Atomically adjust a dealer's running totals in place.
    ///
    /// Returns false when no dealer has the given id.
    pub async fn apply_dealer_delta(
        &self,
        dealer_id: &str,
        delta: &DealerDelta,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        self.bounded("apply_dealer_delta", async {
            let mut conn = self.pool.acquire().await?;
            apply_delta_on(&mut *conn, dealer_id, delta, now).await
        })
        .await
    }
}
