use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{ok, parse_opt, ApiResult, AppState};
use crate::domain::{Decimal, Loan, LoanFilter, LoanStatus, LoanTerms, TimeMs, Transaction};
use crate::engine::PaymentReceipt;

const DEFAULT_CURRENCY: &str = "USDC";
const DEFAULT_TERM_MONTHS: u32 = 6;

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_interest_rate() -> Decimal {
    Decimal::from_units(9)
}

fn default_flat_fee() -> Decimal {
    Decimal::from_units(50)
}

fn default_term() -> u32 {
    DEFAULT_TERM_MONTHS
}

#[derive(Debug, Deserialize)]
pub struct CreateLoanBody {
    pub dealer_id: String,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_interest_rate")]
    pub interest_rate: Decimal,
    #[serde(default = "default_flat_fee")]
    pub flat_fee: Decimal,
    #[serde(default = "default_term", alias = "term_months")]
    pub term: u32,
    pub vehicles_financed: u32,
}

impl From<CreateLoanBody> for LoanTerms {
    fn from(body: CreateLoanBody) -> Self {
        LoanTerms {
            dealer_id: body.dealer_id,
            amount: body.amount,
            currency: body.currency,
            interest_rate: body.interest_rate,
            flat_fee: body.flat_fee,
            term_months: body.term,
            vehicles_financed: body.vehicles_financed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: Decimal,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoansQuery {
    pub dealer_id: Option<String>,
    pub status: Option<String>,
}

/// Evaluation instant for overdue checks, in epoch milliseconds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsOfQuery {
    pub as_of: Option<i64>,
}

impl AsOfQuery {
    fn instant(&self) -> TimeMs {
        self.as_of.map(TimeMs::new).unwrap_or_else(TimeMs::now)
    }
}

pub async fn create_loan(
    State(state): State<AppState>,
    body: Result<Json<CreateLoanBody>, JsonRejection>,
) -> ApiResult<Loan> {
    let Json(body) = body?;
    let loan = state.loans.originate(body.into()).await?;
    ok(loan, "Loan request created")
}

pub async fn list_loans(
    State(state): State<AppState>,
    query: Result<Query<LoansQuery>, QueryRejection>,
) -> ApiResult<Vec<Loan>> {
    let Query(params) = query?;
    let filter = LoanFilter {
        dealer_id: params.dealer_id.filter(|d| !d.is_empty()),
        status: parse_opt::<LoanStatus>(params.status.as_deref())?,
    };
    ok(state.loans.list(&filter).await?, "Loans retrieved")
}

pub async fn get_loan(Path(id): Path<String>, State(state): State<AppState>) -> ApiResult<Loan> {
    ok(state.loans.get(&id).await?, "Loan retrieved")
}

pub async fn get_loan_transactions(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Transaction>> {
    ok(
        state.loans.transactions_for_loan(&id).await?,
        "Loan transactions retrieved",
    )
}

pub async fn approve_loan(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Loan> {
    ok(state.loans.approve(&id).await?, "Loan approved")
}

pub async fn apply_payment(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<PaymentBody>, JsonRejection>,
) -> ApiResult<PaymentReceipt> {
    let Json(payment) = body?;
    let receipt = state
        .loans
        .apply_payment(&id, payment.amount, payment.method)
        .await?;
    let message = format!("Payment of {} applied", receipt.applied());
    ok(receipt, message)
}

pub async fn mark_overdue(
    Path(id): Path<String>,
    State(state): State<AppState>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> ApiResult<Loan> {
    let Query(params) = query?;
    ok(
        state.loans.mark_overdue(&id, params.instant()).await?,
        "Loan marked overdue",
    )
}

pub async fn reinstate(
    Path(id): Path<String>,
    State(state): State<AppState>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> ApiResult<Loan> {
    let Query(params) = query?;
    ok(
        state.loans.reinstate(&id, params.instant()).await?,
        "Loan reinstated",
    )
}

pub async fn sweep_overdue(
    State(state): State<AppState>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> ApiResult<Vec<String>> {
    let Query(params) = query?;
    let ids = state.loans.sweep_overdue(params.instant()).await?;
    let message = format!("{} loans marked overdue", ids.len());
    ok(ids, message)
}
