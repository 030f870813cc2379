use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{ok, parse_opt, ApiResult, AppState};
use crate::domain::{Audit, AuditFilter, AuditRequest, AuditStatus, GeoPoint, TimeMs};
use crate::engine::compliance::{DEFAULT_HISTORY_LIMIT, DEFAULT_LIST_DAYS};
use crate::engine::ComplianceReport;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditsQuery {
    pub dealer_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub status: Option<String>,
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NfcScanBody {
    pub vin: String,
    pub dealer_id: String,
    pub auditor_wallet: String,
    pub location: GeoPoint,
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub resolution_notes: String,
}

fn positive(name: &str, value: i64) -> Result<i64, AppError> {
    if value <= 0 {
        return Err(AppError::InvalidInput(format!("{} must be positive", name)));
    }
    Ok(value)
}

pub async fn create_audit(
    State(state): State<AppState>,
    body: Result<Json<AuditRequest>, JsonRejection>,
) -> ApiResult<Audit> {
    let Json(request) = body?;
    let audit = state.compliance.evaluate(request).await?;
    let message = format!("Audit recorded as {}", audit.status.as_str());
    ok(audit, message)
}

pub async fn nfc_scan(
    State(state): State<AppState>,
    body: Result<Json<NfcScanBody>, JsonRejection>,
) -> ApiResult<Audit> {
    let Json(scan) = body?;
    let audit = state
        .compliance
        .scan_tag(&scan.vin, &scan.dealer_id, &scan.auditor_wallet, scan.location)
        .await?;
    ok(audit, "NFC scan recorded")
}

pub async fn list_audits(
    State(state): State<AppState>,
    query: Result<Query<AuditsQuery>, QueryRejection>,
) -> ApiResult<Vec<Audit>> {
    let Query(params) = query?;
    let days = positive("days", params.days.unwrap_or(DEFAULT_LIST_DAYS))?;
    let filter = AuditFilter {
        dealer_id: params.dealer_id.filter(|d| !d.is_empty()),
        vehicle_id: params.vehicle_id.filter(|v| !v.is_empty()),
        status: parse_opt::<AuditStatus>(params.status.as_deref())?,
        since: Some(TimeMs::now().minus_days(days)),
        limit: params.limit.map(|l| positive("limit", l)).transpose()?,
    };
    ok(state.compliance.list(filter).await?, "Audits retrieved")
}

pub async fn get_audit(Path(id): Path<String>, State(state): State<AppState>) -> ApiResult<Audit> {
    ok(state.compliance.get(&id).await?, "Audit retrieved")
}

pub async fn resolve_audit(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<ResolveBody>, JsonRejection>,
) -> ApiResult<Audit> {
    let Json(resolve) = body?;
    ok(
        state.compliance.resolve(&id, &resolve.resolution_notes).await?,
        "Audit resolved",
    )
}

pub async fn get_vehicle_history(
    Path(id): Path<String>,
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<Audit>> {
    let Query(params) = query?;
    let limit = positive("limit", params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))?;
    ok(
        state.compliance.history(&id, limit).await?,
        "Audit history retrieved",
    )
}

pub async fn get_compliance_report(
    Path(id): Path<String>,
    State(state): State<AppState>,
    query: Result<Query<DaysQuery>, QueryRejection>,
) -> ApiResult<ComplianceReport> {
    let Query(params) = query?;
    let days = params.days.unwrap_or(DEFAULT_LIST_DAYS);
    ok(
        state.compliance.report(&id, days).await?,
        "Compliance report generated",
    )
}
