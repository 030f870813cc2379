pub mod audits;
pub mod dealers;
pub mod health;
pub mod loans;
pub mod transactions;
pub mod vehicles;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::{
    ComplianceEvaluator, DealerAccounts, ExternalRefGenerator, Inventory, LoanEngine,
    RandomRefGenerator, TransactionRecorder,
};
use crate::error::AppError;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repo: Arc<Repository>,
    pub accounts: DealerAccounts,
    pub loans: LoanEngine,
    pub inventory: Inventory,
    pub compliance: ComplianceEvaluator,
    pub recorder: TransactionRecorder,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        Self::with_refs(repo, config, Arc::new(RandomRefGenerator))
    }

    pub fn with_refs(
        repo: Arc<Repository>,
        config: Config,
        refs: Arc<dyn ExternalRefGenerator>,
    ) -> Self {
        let recorder = TransactionRecorder::new(repo.clone(), refs);
        Self {
            accounts: DealerAccounts::new(repo.clone(), recorder.clone()),
            loans: LoanEngine::new(repo.clone(), recorder.clone()),
            inventory: Inventory::new(repo.clone(), recorder.refs().clone()),
            compliance: ComplianceEvaluator::new(repo.clone(), config.default_lot),
            repo,
            recorder,
            config,
        }
    }
}

/// Uniform response body: `{ success, data, message }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

pub(crate) fn ok<T>(data: T, message: impl Into<String>) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data: Some(data),
        message: message.into(),
    }))
}

pub(crate) fn done(message: impl Into<String>) -> ApiResult<()> {
    Ok(Json(Envelope {
        success: true,
        data: None,
        message: message.into(),
    }))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        // Dealers
        .route("/v1/dealers/connect-wallet", post(dealers::connect_wallet))
        .route(
            "/v1/dealers/:id",
            get(dealers::get_dealer).put(dealers::update_dealer),
        )
        .route("/v1/dealers/wallet/:wallet", get(dealers::get_dealer_by_wallet))
        .route("/v1/dealers/:id/loans", get(dealers::get_dealer_loans))
        .route("/v1/dealers/:id/vehicles", get(dealers::get_dealer_vehicles))
        .route(
            "/v1/dealers/:id/transactions",
            get(dealers::get_dealer_transactions),
        )
        .route(
            "/v1/dealers/:id/notifications",
            get(dealers::get_dealer_notifications),
        )
        .route(
            "/v1/dealers/:id/notifications/:nid/mark-read",
            post(dealers::mark_notification_read),
        )
        .route("/v1/dealers/:id/reconcile", get(dealers::reconcile_dealer))
        .route("/v1/dealers/:id/rewards", post(dealers::award_tokens))
        // Loans
        .route("/v1/loans", post(loans::create_loan).get(loans::list_loans))
        .route("/v1/loans/overdue-sweep", post(loans::sweep_overdue))
        .route("/v1/loans/:id", get(loans::get_loan))
        .route("/v1/loans/:id/transactions", get(loans::get_loan_transactions))
        .route("/v1/loans/:id/approve", post(loans::approve_loan))
        .route("/v1/loans/:id/payment", post(loans::apply_payment))
        .route("/v1/loans/:id/mark-overdue", post(loans::mark_overdue))
        .route("/v1/loans/:id/reinstate", post(loans::reinstate))
        // Vehicles
        .route(
            "/v1/vehicles",
            post(vehicles::add_vehicle).get(vehicles::list_vehicles),
        )
        .route(
            "/v1/vehicles/:id",
            get(vehicles::get_vehicle)
                .put(vehicles::update_vehicle)
                .delete(vehicles::remove_vehicle),
        )
        .route("/v1/vehicles/vin/:vin", get(vehicles::get_vehicle_by_vin))
        .route("/v1/vehicles/:id/sell", post(vehicles::sell_vehicle))
        .route("/v1/vehicles/:id/location", post(vehicles::relocate_vehicle))
        // Audits
        .route(
            "/v1/audits",
            post(audits::create_audit).get(audits::list_audits),
        )
        .route("/v1/audits/nfc-scan", post(audits::nfc_scan))
        .route("/v1/audits/:id", get(audits::get_audit))
        .route("/v1/audits/:id/resolve", post(audits::resolve_audit))
        .route(
            "/v1/audits/vehicle/:id/history",
            get(audits::get_vehicle_history),
        )
        .route(
            "/v1/audits/dealer/:id/compliance",
            get(audits::get_compliance_report),
        )
        // Transactions
        .route(
            "/v1/transactions",
            post(transactions::record_transaction).get(transactions::list_transactions),
        )
        .route("/v1/transactions/:id", get(transactions::get_transaction))
        .route(
            "/v1/transactions/dealer/:id/summary",
            get(transactions::get_dealer_summary),
        )
        .layer(cors)
        .with_state(state)
}

/// Parse an optional status-like query value, treating an empty string as absent.
pub(crate) fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    AppError: From<T::Err>,
{
    match raw {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(value.parse::<T>()?)),
    }
}
