use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{ok, parse_opt, ApiResult, AppState};
use crate::domain::{Decimal, TimeMs, Transaction, TransactionFilter, TransactionType};
use crate::engine::recorder::DEFAULT_LIST_DAYS;
use crate::engine::{TransactionDraft, TransactionSummary};
use crate::error::AppError;

const SUMMARY_DEFAULT_DAYS: i64 = 30;

fn default_currency() -> String {
    "USDC".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RecordBody {
    pub dealer_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub loan_id: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub dealer_id: Option<String>,
    pub loan_id: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<i64>,
}

/// Manual ledger entries. Disbursements, payments and rewards are only
/// produced by their owning operations.
pub async fn record_transaction(
    State(state): State<AppState>,
    body: Result<Json<RecordBody>, JsonRejection>,
) -> ApiResult<Transaction> {
    let Json(body) = body?;
    if body.tx_type != TransactionType::Fee {
        return Err(AppError::InvalidInput(format!(
            "{} entries cannot be recorded directly",
            body.tx_type
        )));
    }
    let tx = state
        .recorder
        .record(TransactionDraft {
            dealer_id: body.dealer_id,
            tx_type: body.tx_type,
            amount: body.amount,
            currency: body.currency,
            loan_id: body.loan_id,
            method: body.method,
            external_ref: None,
        })
        .await?;
    ok(tx, "Transaction recorded")
}

pub async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> ApiResult<Vec<Transaction>> {
    let Query(params) = query?;
    let days = params.days.unwrap_or(DEFAULT_LIST_DAYS);
    if days <= 0 {
        return Err(AppError::InvalidInput("days must be positive".into()));
    }
    if params.limit.is_some_and(|l| l <= 0) {
        return Err(AppError::InvalidInput("limit must be positive".into()));
    }
    let filter = TransactionFilter {
        dealer_id: params.dealer_id.filter(|d| !d.is_empty()),
        loan_id: params.loan_id.filter(|l| !l.is_empty()),
        tx_type: parse_opt::<TransactionType>(params.tx_type.as_deref())?,
        since: Some(TimeMs::now().minus_days(days)),
        limit: params.limit,
    };
    ok(state.recorder.list(filter).await?, "Transactions retrieved")
}

pub async fn get_transaction(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Transaction> {
    ok(state.recorder.get(&id).await?, "Transaction retrieved")
}

pub async fn get_dealer_summary(
    Path(id): Path<String>,
    State(state): State<AppState>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> ApiResult<TransactionSummary> {
    let Query(params) = query?;
    let days = params.days.unwrap_or(SUMMARY_DEFAULT_DAYS);
    ok(
        state.recorder.summary(&id, days).await?,
        "Transaction summary generated",
    )
}
