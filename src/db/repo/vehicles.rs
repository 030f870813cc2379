//! Vehicle inventory operations.

use crate::db::StoreError;
use crate::domain::{GeoPoint, TimeMs, Vehicle, VehicleFilter, VehiclePatch, VehicleStatus, Vin};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{get_money, get_opt_point, get_opt_time, get_time, get_variant, minor, Repository};

const VEHICLE_COLUMNS: &str = r#"
    id, dealer_id, vin, make, model, year, mileage, color, price_minor, status,
    nfc_tag_id, token_id, loan_id, last_audit, gps_lat, gps_lng, sold_date,
    created_at, updated_at
"#;

fn vehicle_from_row(row: &SqliteRow) -> Result<Vehicle, StoreError> {
    let vin: String = row.try_get("vin")?;
    Ok(Vehicle {
        id: row.try_get("id")?,
        dealer_id: row.try_get("dealer_id")?,
        vin: vin
            .parse::<Vin>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        make: row.try_get("make")?,
        model: row.try_get("model")?,
        year: row.try_get("year")?,
        mileage: row.try_get("mileage")?,
        color: row.try_get("color")?,
        price: get_money(row, "price_minor")?,
        status: get_variant(row, "status")?,
        nfc_tag_id: row.try_get("nfc_tag_id")?,
        token_id: row.try_get("token_id")?,
        loan_id: row.try_get("loan_id")?,
        last_audit: get_opt_time(row, "last_audit")?,
        gps_location: get_opt_point(row, "gps_lat", "gps_lng")?,
        sold_date: get_opt_time(row, "sold_date")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

impl Repository {
    /// Insert a new vehicle.
    ///
    /// # Errors
    /// `StoreError::Conflict` if the VIN is already registered.
    pub async fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        self.bounded("insert_vehicle", async {
            sqlx::query(
                r#"
                INSERT INTO vehicles (
                    id, dealer_id, vin, make, model, year, mileage, color, price_minor,
                    status, nfc_tag_id, token_id, loan_id, last_audit, gps_lat, gps_lng,
                    sold_date, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&vehicle.id)
            .bind(&vehicle.dealer_id)
            .bind(vehicle.vin.as_str())
            .bind(&vehicle.make)
            .bind(&vehicle.model)
            .bind(vehicle.year)
            .bind(vehicle.mileage)
            .bind(&vehicle.color)
            .bind(minor(vehicle.price)?)
            .bind(vehicle.status.as_str())
            .bind(vehicle.nfc_tag_id.as_deref())
            .bind(vehicle.token_id.as_deref())
            .bind(vehicle.loan_id.as_deref())
            .bind(vehicle.last_audit.map(|t| t.as_ms()))
            .bind(vehicle.gps_location.map(|p| p.lat))
            .bind(vehicle.gps_location.map(|p| p.lng))
            .bind(vehicle.sold_date.map(|t| t.as_ms()))
            .bind(vehicle.created_at.as_ms())
            .bind(vehicle.updated_at.as_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Get a vehicle by id.
    pub async fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>, StoreError> {
        self.bounded("get_vehicle", async {
            let sql = format!("SELECT {} FROM vehicles WHERE id = ?", VEHICLE_COLUMNS);
            let row = sqlx::query(&sql)
                .bind(vehicle_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(vehicle_from_row).transpose()
        })
        .await
    }

    /// Get a vehicle by VIN.
    pub async fn get_vehicle_by_vin(&self, vin: &Vin) -> Result<Option<Vehicle>, StoreError> {
        self.bounded("get_vehicle_by_vin", async {
            let sql = format!("SELECT {} FROM vehicles WHERE vin = ?", VEHICLE_COLUMNS);
            let row = sqlx::query(&sql)
                .bind(vin.as_str())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(vehicle_from_row).transpose()
        })
        .await
    }

    /// Get a vehicle by the id of its attached NFC tag.
    pub async fn get_vehicle_by_tag(&self, tag_id: &str) -> Result<Option<Vehicle>, StoreError> {
        self.bounded("get_vehicle_by_tag", async {
            let sql = format!(
                "SELECT {} FROM vehicles WHERE nfc_tag_id = ?",
                VEHICLE_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(tag_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(vehicle_from_row).transpose()
        })
        .await
    }

    /// Query vehicles, newest first.
    pub async fn find_vehicles(&self, filter: &VehicleFilter) -> Result<Vec<Vehicle>, StoreError> {
        self.bounded("find_vehicles", async {
            let sql = format!(
                r#"
                SELECT {}
                FROM vehicles
                WHERE (? IS NULL OR dealer_id = ?)
                  AND (? IS NULL OR status = ?)
                  AND (? IS NULL OR loan_id = ?)
                ORDER BY created_at DESC, id ASC
                "#,
                VEHICLE_COLUMNS
            );
            let status = filter.status.map(|s| s.as_str());
            let rows = sqlx::query(&sql)
                .bind(filter.dealer_id.as_deref())
                .bind(filter.dealer_id.as_deref())
                .bind(status)
                .bind(status)
                .bind(filter.loan_id.as_deref())
                .bind(filter.loan_id.as_deref())
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(vehicle_from_row).collect()
        })
        .await
    }

    /// Apply a patch in one statement. Moving to `sold` stamps `sold_date`
    /// with `now` unless one is already set.
    ///
    /// Returns false when no vehicle has the given id.
    pub async fn update_vehicle(
        &self,
        vehicle_id: &str,
        patch: &VehiclePatch,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        self.bounded("update_vehicle", async {
            let status = patch.status.map(|s| s.as_str());
            let result = sqlx::query(
                r#"
                UPDATE vehicles SET
                    mileage = COALESCE(?, mileage),
                    price_minor = COALESCE(?, price_minor),
                    status = COALESCE(?, status),
                    sold_date = CASE WHEN ? = ? THEN COALESCE(sold_date, ?) ELSE sold_date END,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(patch.mileage)
            .bind(patch.price.map(minor).transpose()?)
            .bind(status)
            .bind(status)
            .bind(VehicleStatus::Sold.as_str())
            .bind(now.as_ms())
            .bind(now.as_ms())
            .bind(vehicle_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Record a new GPS fix for a vehicle.
    ///
    /// Returns false when no vehicle has the given id.
    pub async fn set_vehicle_location(
        &self,
        vehicle_id: &str,
        location: GeoPoint,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        self.bounded("set_vehicle_location", async {
            let result = sqlx::query(
                "UPDATE vehicles SET gps_lat = ?, gps_lng = ?, updated_at = ? WHERE id = ?",
            )
            .bind(location.lat)
            .bind(location.lng)
            .bind(now.as_ms())
            .bind(vehicle_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Delete a vehicle. Its audits are kept.
    ///
    /// Returns false when no vehicle has the given id.
    pub async fn delete_vehicle(&self, vehicle_id: &str) -> Result<bool, StoreError> {
        self.bounded("delete_vehicle", async {
            let result = sqlx::query("DELETE FROM vehicles WHERE id = ?")
                .bind(vehicle_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
