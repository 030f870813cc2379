use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{done, ok, parse_opt, ApiResult, AppState};
use crate::domain::{Decimal, GeoPoint, NewVehicle, Vehicle, VehicleFilter, VehiclePatch, VehicleStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclesQuery {
    pub dealer_id: Option<String>,
    pub status: Option<String>,
    pub loan_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SellBody {
    pub price: Option<Decimal>,
}

pub async fn add_vehicle(
    State(state): State<AppState>,
    body: Result<Json<NewVehicle>, JsonRejection>,
) -> ApiResult<Vehicle> {
    let Json(new) = body?;
    ok(state.inventory.add(new).await?, "Vehicle added")
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    query: Result<Query<VehiclesQuery>, QueryRejection>,
) -> ApiResult<Vec<Vehicle>> {
    let Query(params) = query?;
    let filter = VehicleFilter {
        dealer_id: params.dealer_id.filter(|d| !d.is_empty()),
        status: parse_opt::<VehicleStatus>(params.status.as_deref())?,
        loan_id: params.loan_id.filter(|l| !l.is_empty()),
    };
    ok(state.inventory.list(&filter).await?, "Vehicles retrieved")
}

pub async fn get_vehicle(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vehicle> {
    ok(state.inventory.get(&id).await?, "Vehicle retrieved")
}

pub async fn get_vehicle_by_vin(
    Path(vin): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vehicle> {
    ok(state.inventory.get_by_vin(&vin).await?, "Vehicle retrieved")
}

pub async fn update_vehicle(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<VehiclePatch>, JsonRejection>,
) -> ApiResult<Vehicle> {
    let Json(patch) = body?;
    ok(state.inventory.update(&id, &patch).await?, "Vehicle updated")
}

pub async fn remove_vehicle(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<()> {
    state.inventory.remove(&id).await?;
    done("Vehicle removed")
}

/// An empty body sells at the listed price.
pub async fn sell_vehicle(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<SellBody>>,
) -> ApiResult<Vehicle> {
    let price = body.and_then(|Json(b)| b.price);
    ok(state.inventory.sell(&id, price).await?, "Vehicle marked as sold")
}

pub async fn relocate_vehicle(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<GeoPoint>, JsonRejection>,
) -> ApiResult<Vehicle> {
    let Json(location) = body?;
    ok(
        state.inventory.relocate(&id, location).await?,
        "Vehicle location updated",
    )
}
