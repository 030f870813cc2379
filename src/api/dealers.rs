use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{done, ok, ApiResult, AppState};
use crate::domain::{Dealer, DealerPatch, Loan, NewDealer, Notification, Transaction, Vehicle, VehicleFilter};
use crate::engine::Reconciliation;

#[derive(Debug, Deserialize)]
pub struct RewardBody {
    pub tokens: i64,
    #[serde(default)]
    pub reason: String,
}

pub async fn connect_wallet(
    State(state): State<AppState>,
    body: Result<Json<NewDealer>, JsonRejection>,
) -> ApiResult<Dealer> {
    let Json(profile) = body?;
    let dealer = state.accounts.connect_wallet(profile).await?;
    ok(dealer, "Wallet connected")
}

pub async fn get_dealer(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Dealer> {
    ok(state.accounts.get(&id).await?, "Dealer retrieved")
}

pub async fn get_dealer_by_wallet(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Dealer> {
    ok(state.accounts.get_by_wallet(&wallet).await?, "Dealer retrieved")
}

pub async fn update_dealer(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<DealerPatch>, JsonRejection>,
) -> ApiResult<Dealer> {
    let Json(patch) = body?;
    ok(state.accounts.update(&id, &patch).await?, "Dealer updated")
}

pub async fn get_dealer_loans(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Loan>> {
    ok(state.loans.list_by_dealer(&id).await?, "Loans retrieved")
}

pub async fn get_dealer_vehicles(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Vehicle>> {
    let filter = VehicleFilter {
        dealer_id: Some(id),
        ..Default::default()
    };
    ok(state.inventory.list(&filter).await?, "Vehicles retrieved")
}

pub async fn get_dealer_transactions(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Transaction>> {
    ok(state.recorder.for_dealer(&id).await?, "Transactions retrieved")
}

pub async fn get_dealer_notifications(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Notification>> {
    ok(state.accounts.notifications(&id).await?, "Notifications retrieved")
}

pub async fn mark_notification_read(
    Path((id, nid)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<()> {
    state.accounts.mark_read(&id, &nid).await?;
    done("Notification marked as read")
}

pub async fn reconcile_dealer(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Reconciliation> {
    ok(state.accounts.reconcile(&id).await?, "Dealer reconciled")
}

pub async fn award_tokens(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<RewardBody>, JsonRejection>,
) -> ApiResult<Transaction> {
    let Json(reward) = body?;
    let tx = state
        .accounts
        .award_tokens(&id, reward.tokens, &reward.reason)
        .await?;
    ok(tx, format!("{} ANVL tokens awarded", reward.tokens))
}
