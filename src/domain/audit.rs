//! Collateral location audits.

use crate::domain::{GeoPoint, TimeMs, UnknownVariant, Vin};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Compliant,
    Flagged,
    Violation,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Compliant => "compliant",
            AuditStatus::Flagged => "flagged",
            AuditStatus::Violation => "violation",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliant" => Ok(AuditStatus::Compliant),
            "flagged" => Ok(AuditStatus::Flagged),
            "violation" => Ok(AuditStatus::Violation),
            other => Err(UnknownVariant::new("audit status", other)),
        }
    }
}

/// A recorded location check. Immutable apart from resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub id: String,
    pub vehicle_id: String,
    pub vin: Vin,
    pub dealer_id: String,
    pub location: GeoPoint,
    pub timestamp: TimeMs,
    pub status: AuditStatus,
    pub auditor_wallet: String,
    pub nfc_tag_scanned: bool,
    pub notes: String,
}

/// An inbound audit submission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditRequest {
    pub vehicle_id: String,
    pub vin: String,
    pub dealer_id: String,
    pub location: GeoPoint,
    pub auditor_wallet: String,
    #[serde(default = "default_nfc_scanned")]
    pub nfc_tag_scanned: bool,
    #[serde(default)]
    pub notes: String,
}

fn default_nfc_scanned() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub dealer_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub status: Option<AuditStatus>,
    pub since: Option<TimeMs>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_request_defaults() {
        let req: AuditRequest = serde_json::from_str(
            r#"{
                "vehicle_id": "v1",
                "vin": "1HGCM82633A004352",
                "dealer_id": "d1",
                "location": {"lat": 34.0522, "lng": -118.2437},
                "auditor_wallet": "0xabc"
            }"#,
        )
        .unwrap();
        assert!(req.nfc_tag_scanned);
        assert_eq!(req.notes, "");
    }

    #[test]
    fn test_audit_status_strings() {
        assert_eq!(AuditStatus::Flagged.as_str(), "flagged");
        assert_eq!(
            "violation".parse::<AuditStatus>().unwrap(),
            AuditStatus::Violation
        );
    }
}
