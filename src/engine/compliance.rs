//! Collateral location audits.

use crate::db::Repository;
use crate::domain::{
    Audit, AuditFilter, AuditRequest, AuditStatus, GeoPoint, Notification, Severity, TimeMs, Vin,
};
use crate::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest combined latitude + longitude offset from the lot, in degrees,
/// that still counts as on the lot (roughly 500 m).
pub const LOCATION_TOLERANCE_DEGREES: f64 = 0.005;
pub const DEFAULT_LIST_DAYS: i64 = 30;
pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
const REPORT_RECENT: i64 = 10;
const NFC_SCAN_NOTE: &str = "NFC tag scanned successfully";

/// Compliance decision for a reported position against the expected lot.
pub fn classify(reported: &GeoPoint, lot: &GeoPoint) -> AuditStatus {
    if reported.manhattan_degrees(lot) > LOCATION_TOLERANCE_DEGREES {
        AuditStatus::Flagged
    } else {
        AuditStatus::Compliant
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub period_days: i64,
    pub total_audits: i64,
    pub compliant_audits: i64,
    pub flagged_audits: i64,
    pub violation_audits: i64,
    /// Compliant over total, 0 when there are no audits.
    pub compliance_rate: f64,
    pub recent_audits: Vec<Audit>,
}

#[derive(Clone)]
pub struct ComplianceEvaluator {
    repo: Arc<Repository>,
    default_lot: GeoPoint,
}

impl ComplianceEvaluator {
    pub fn new(repo: Arc<Repository>, default_lot: GeoPoint) -> Self {
        Self { repo, default_lot }
    }

    /// Record an audit of a vehicle's reported position.
    ///
    /// The audit is always stored. A position outside the dealer's lot
    /// tolerance is flagged and raises a warning to the dealer in the same
    /// unit of work.
    pub async fn evaluate(&self, request: AuditRequest) -> Result<Audit, AppError> {
        let vin: Vin = request.vin.parse()?;
        let location = GeoPoint::new(request.location.lat, request.location.lng)?;

        let vehicle = self
            .repo
            .get_vehicle(&request.vehicle_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {}", request.vehicle_id)))?;
        if vehicle.vin != vin {
            return Err(AppError::InvalidInput(format!(
                "VIN {} does not match vehicle {}",
                vin, vehicle.id
            )));
        }
        if vehicle.dealer_id != request.dealer_id {
            return Err(AppError::InvalidInput(format!(
                "vehicle {} does not belong to dealer {}",
                vehicle.id, request.dealer_id
            )));
        }
        let dealer = self
            .repo
            .get_dealer(&request.dealer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dealer {}", request.dealer_id)))?;

        let lot = dealer.lot_location.unwrap_or(self.default_lot);
        let status = classify(&location, &lot);
        let now = TimeMs::now();

        let audit = Audit {
            id: uuid::Uuid::new_v4().to_string(),
            vehicle_id: vehicle.id.clone(),
            vin,
            dealer_id: dealer.id.clone(),
            location,
            timestamp: now,
            status,
            auditor_wallet: request.auditor_wallet,
            nfc_tag_scanned: request.nfc_tag_scanned,
            notes: request.notes,
        };
        let alert = match status {
            AuditStatus::Flagged => Some(Notification::new(
                &dealer.id,
                "compliance_alert",
                "Vehicle Location Alert",
                format!("Vehicle VIN {} flagged for location compliance", audit.vin),
                Severity::Warning,
                now,
            )),
            AuditStatus::Compliant | AuditStatus::Violation => None,
        };

        if !self.repo.commit_audit(&audit, alert.as_ref()).await? {
            return Err(AppError::NotFound(format!("vehicle {}", vehicle.id)));
        }

        match status {
            AuditStatus::Flagged => warn!(
                audit_id = %audit.id,
                vehicle_id = %audit.vehicle_id,
                dealer_id = %audit.dealer_id,
                offset_degrees = location.manhattan_degrees(&lot),
                "Vehicle flagged outside lot"
            ),
            _ => info!(audit_id = %audit.id, vehicle_id = %audit.vehicle_id, "Vehicle audited on lot"),
        }
        Ok(audit)
    }

    /// NFC scan entry point: resolves the vehicle by VIN and audits it as scanned.
    pub async fn scan_tag(
        &self,
        vin: &str,
        dealer_id: &str,
        auditor_wallet: &str,
        location: GeoPoint,
    ) -> Result<Audit, AppError> {
        let parsed: Vin = vin.parse()?;
        let vehicle = self
            .repo
            .get_vehicle_by_vin(&parsed)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle with VIN {}", parsed)))?;

        self.evaluate(AuditRequest {
            vehicle_id: vehicle.id,
            vin: parsed.to_string(),
            dealer_id: dealer_id.to_string(),
            location,
            auditor_wallet: auditor_wallet.to_string(),
            nfc_tag_scanned: true,
            notes: NFC_SCAN_NOTE.to_string(),
        })
        .await
    }

    /// Force an audit back to compliant, replacing its notes with the resolution.
    /// Resolving an already compliant audit is not an error.
    pub async fn resolve(&self, audit_id: &str, resolution_notes: &str) -> Result<Audit, AppError> {
        let notes = format!("{} (Resolved)", resolution_notes);
        if !self.repo.resolve_audit(audit_id, &notes).await? {
            return Err(AppError::NotFound(format!("audit {}", audit_id)));
        }
        info!(audit_id, "Audit resolved");
        self.get(audit_id).await
    }

    pub async fn get(&self, audit_id: &str) -> Result<Audit, AppError> {
        self.repo
            .get_audit(audit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("audit {}", audit_id)))
    }

    /// Newest-first listing, bounded to the default window and limit when the
    /// filter leaves them open.
    pub async fn list(&self, mut filter: AuditFilter) -> Result<Vec<Audit>, AppError> {
        filter
            .since
            .get_or_insert_with(|| TimeMs::now().minus_days(DEFAULT_LIST_DAYS));
        filter.limit.get_or_insert(DEFAULT_LIST_LIMIT);
        Ok(self.repo.find_audits(&filter).await?)
    }

    pub async fn history(&self, vehicle_id: &str, limit: i64) -> Result<Vec<Audit>, AppError> {
        Ok(self
            .repo
            .find_audits(&AuditFilter {
                vehicle_id: Some(vehicle_id.to_string()),
                limit: Some(limit),
                ..Default::default()
            })
            .await?)
    }

    /// Audit outcome counts and compliance rate over the trailing `days`.
    pub async fn report(&self, dealer_id: &str, days: i64) -> Result<ComplianceReport, AppError> {
        if days <= 0 {
            return Err(AppError::InvalidInput("days must be positive".into()));
        }
        let since = TimeMs::now().minus_days(days);
        let counts = self.repo.count_audits_by_status(dealer_id, since).await?;
        let count_of = |status: AuditStatus| -> i64 {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, n)| *n)
                .sum()
        };
        let compliant = count_of(AuditStatus::Compliant);
        let flagged = count_of(AuditStatus::Flagged);
        let violation = count_of(AuditStatus::Violation);
        let total = compliant + flagged + violation;

        let recent_audits = self
            .repo
            .find_audits(&AuditFilter {
                dealer_id: Some(dealer_id.to_string()),
                since: Some(since),
                limit: Some(REPORT_RECENT),
                ..Default::default()
            })
            .await?;

        Ok(ComplianceReport {
            period_days: days,
            total_audits: total,
            compliant_audits: compliant,
            flagged_audits: flagged,
            violation_audits: violation,
            compliance_rate: if total == 0 {
                0.0
            } else {
                compliant as f64 / total as f64
            },
            recent_audits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_threshold() {
        let lot = GeoPoint { lat: 34.0522, lng: -118.2437 };
        assert_eq!(classify(&lot, &lot), AuditStatus::Compliant);

        let near = GeoPoint { lat: 34.0542, lng: -118.2417 };
        assert_eq!(classify(&near, &lot), AuditStatus::Compliant);

        let far = GeoPoint { lat: 34.0622, lng: -118.2437 };
        assert_eq!(classify(&far, &lot), AuditStatus::Flagged);
    }

    #[test]
    fn test_classify_is_manhattan_not_euclidean() {
        let lot = GeoPoint { lat: 0.0, lng: 0.0 };
        // Euclidean distance is about 0.0042, the combined offset is 0.006.
        let diagonal = GeoPoint { lat: 0.003, lng: 0.003 };
        assert_eq!(classify(&diagonal, &lot), AuditStatus::Flagged);
    }
}
