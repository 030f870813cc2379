//! Vehicle inventory held as loan collateral.

use crate::domain::{Decimal, GeoPoint, TimeMs, UnknownVariant, Vin};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    OnLot,
    Sold,
    Pending,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::OnLot => "on_lot",
            VehicleStatus::Sold => "sold",
            VehicleStatus::Pending => "pending",
        }
    }
}

impl FromStr for VehicleStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_lot" => Ok(VehicleStatus::OnLot),
            "sold" => Ok(VehicleStatus::Sold),
            "pending" => Ok(VehicleStatus::Pending),
            other => Err(UnknownVariant::new("vehicle status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub dealer_id: String,
    pub vin: Vin,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage: i64,
    pub color: String,
    pub price: Decimal,
    pub status: VehicleStatus,
    pub nfc_tag_id: Option<String>,
    pub token_id: Option<String>,
    /// Back-reference to the loan this vehicle secures.
    pub loan_id: Option<String>,
    pub last_audit: Option<TimeMs>,
    pub gps_location: Option<GeoPoint>,
    pub sold_date: Option<TimeMs>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewVehicle {
    pub dealer_id: String,
    pub vin: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage: i64,
    pub color: String,
    pub price: Decimal,
    #[serde(default)]
    pub loan_id: Option<String>,
}

/// Partial vehicle update. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VehiclePatch {
    pub mileage: Option<i64>,
    pub price: Option<Decimal>,
    pub status: Option<VehicleStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleFilter {
    pub dealer_id: Option<String>,
    pub status: Option<VehicleStatus>,
    pub loan_id: Option<String>,
}
