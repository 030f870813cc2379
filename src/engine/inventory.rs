//! Vehicle inventory held as collateral.

use crate::db::Repository;
use crate::domain::{
    GeoPoint, NewVehicle, TimeMs, Vehicle, VehicleFilter, VehiclePatch, VehicleStatus, Vin,
};
use crate::engine::recorder::ExternalRefGenerator;
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct Inventory {
    repo: Arc<Repository>,
    refs: Arc<dyn ExternalRefGenerator>,
}

fn validate_patch(patch: &VehiclePatch) -> Result<(), AppError> {
    if patch.mileage.is_some_and(|m| m < 0) {
        return Err(AppError::InvalidInput("mileage must not be negative".into()));
    }
    if let Some(price) = patch.price {
        if price.is_negative() {
            return Err(AppError::InvalidInput("price must not be negative".into()));
        }
        if !price.fits_minor() {
            return Err(AppError::InvalidInput(format!(
                "price {} exceeds the largest storable amount",
                price
            )));
        }
    }
    Ok(())
}

impl Inventory {
    pub fn new(repo: Arc<Repository>, refs: Arc<dyn ExternalRefGenerator>) -> Self {
        Self { repo, refs }
    }

    /// Register a vehicle on a dealer's lot, tagging it with fresh NFC and
    /// token identifiers.
    pub async fn add(&self, new: NewVehicle) -> Result<Vehicle, AppError> {
        let vin: Vin = new.vin.parse()?;
        validate_patch(&VehiclePatch {
            mileage: Some(new.mileage),
            price: Some(new.price),
            status: None,
        })?;
        if !self.repo.dealer_exists(&new.dealer_id).await? {
            return Err(AppError::NotFound(format!("dealer {}", new.dealer_id)));
        }
        if let Some(loan_id) = new.loan_id.as_deref() {
            let loan = self
                .repo
                .get_loan(loan_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("loan {}", loan_id)))?;
            if loan.dealer_id != new.dealer_id {
                return Err(AppError::InvalidInput(format!(
                    "loan {} belongs to another dealer",
                    loan_id
                )));
            }
        }

        let now = TimeMs::now();
        let vehicle = Vehicle {
            id: uuid::Uuid::new_v4().to_string(),
            dealer_id: new.dealer_id,
            vin,
            make: new.make,
            model: new.model,
            year: new.year,
            mileage: new.mileage,
            color: new.color,
            price: new.price.round_minor(),
            status: VehicleStatus::OnLot,
            nfc_tag_id: Some(self.refs.nfc_tag_id()),
            token_id: Some(self.refs.token_id()),
            loan_id: new.loan_id,
            last_audit: None,
            gps_location: None,
            sold_date: None,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_vehicle(&vehicle).await?;
        info!(vehicle_id = %vehicle.id, dealer_id = %vehicle.dealer_id, vin = %vehicle.vin, "Vehicle added");
        Ok(vehicle)
    }

    pub async fn get(&self, vehicle_id: &str) -> Result<Vehicle, AppError> {
        self.repo
            .get_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {}", vehicle_id)))
    }

    pub async fn get_by_vin(&self, vin: &str) -> Result<Vehicle, AppError> {
        let vin: Vin = vin.parse()?;
        self.repo
            .get_vehicle_by_vin(&vin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle with VIN {}", vin)))
    }

    pub async fn list(&self, filter: &VehicleFilter) -> Result<Vec<Vehicle>, AppError> {
        Ok(self.repo.find_vehicles(filter).await?)
    }

    pub async fn update(&self, vehicle_id: &str, patch: &VehiclePatch) -> Result<Vehicle, AppError> {
        validate_patch(patch)?;
        let patch = VehiclePatch {
            price: patch.price.map(|p| p.round_minor()),
            ..patch.clone()
        };
        if !self
            .repo
            .update_vehicle(vehicle_id, &patch, TimeMs::now())
            .await?
        {
            return Err(AppError::NotFound(format!("vehicle {}", vehicle_id)));
        }
        self.get(vehicle_id).await
    }

    /// Mark a vehicle sold, optionally recording the sale price.
    pub async fn sell(
        &self,
        vehicle_id: &str,
        price: Option<crate::domain::Decimal>,
    ) -> Result<Vehicle, AppError> {
        let vehicle = self.get(vehicle_id).await?;
        if vehicle.status == VehicleStatus::Sold {
            return Err(AppError::InvalidState(format!(
                "vehicle {} is already sold",
                vehicle_id
            )));
        }
        let sold = self
            .update(
                vehicle_id,
                &VehiclePatch {
                    mileage: None,
                    price,
                    status: Some(VehicleStatus::Sold),
                },
            )
            .await?;
        info!(vehicle_id, price = %sold.price, "Vehicle sold");
        Ok(sold)
    }

    /// Record a GPS fix for a vehicle outside of an audit.
    pub async fn relocate(&self, vehicle_id: &str, location: GeoPoint) -> Result<Vehicle, AppError> {
        let location = GeoPoint::new(location.lat, location.lng)?;
        if !self
            .repo
            .set_vehicle_location(vehicle_id, location, TimeMs::now())
            .await?
        {
            return Err(AppError::NotFound(format!("vehicle {}", vehicle_id)));
        }
        self.get(vehicle_id).await
    }

    pub async fn remove(&self, vehicle_id: &str) -> Result<(), AppError> {
        if !self.repo.delete_vehicle(vehicle_id).await? {
            return Err(AppError::NotFound(format!("vehicle {}", vehicle_id)));
        }
        info!(vehicle_id, "Vehicle removed");
        Ok(())
    }
}
