//! Dealer profile and its derived running totals.

use crate::domain::{Decimal, GeoPoint, TimeMs, UnknownVariant, WalletAddress};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// KYC / account status of a dealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealerStatus {
    Pending,
    Approved,
    Suspended,
}

impl DealerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealerStatus::Pending => "pending",
            DealerStatus::Approved => "approved",
            DealerStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for DealerStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DealerStatus::Pending),
            "approved" => Ok(DealerStatus::Approved),
            "suspended" => Ok(DealerStatus::Suspended),
            other => Err(UnknownVariant::new("dealer status", other)),
        }
    }
}

/// A dealer account.
///
/// `anvl_tokens`, `total_loaned`, `total_repaid` and `active_loans` are a
/// projection of the ledger, adjusted only through loan events and recorded
/// transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dealer {
    pub id: String,
    pub wallet_address: WalletAddress,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub ach_connected: bool,
    pub kyc_status: DealerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_location: Option<GeoPoint>,
    pub anvl_tokens: i64,
    pub total_loaned: Decimal,
    pub total_repaid: Decimal,
    pub active_loans: i64,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Dealer {
    /// A freshly onboarded dealer: pending KYC and zero totals.
    pub fn onboard(profile: NewDealer, now: TimeMs) -> Self {
        Dealer {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_address: profile.wallet_address,
            name: profile.name,
            address: profile.address,
            phone: profile.phone,
            email: profile.email,
            ach_connected: false,
            kyc_status: DealerStatus::Pending,
            lot_location: profile.lot_location,
            anvl_tokens: 0,
            total_loaned: Decimal::zero(),
            total_repaid: Decimal::zero(),
            active_loans: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Profile submitted on first wallet connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewDealer {
    pub wallet_address: WalletAddress,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub lot_location: Option<GeoPoint>,
}

/// Partial profile update. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DealerPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub ach_connected: Option<bool>,
    pub kyc_status: Option<DealerStatus>,
    pub lot_location: Option<GeoPoint>,
}

impl DealerPatch {
    pub fn is_empty(&self) -> bool {
        *self == DealerPatch::default()
    }
}

/// Increment-in-place adjustment of a dealer's running totals.
///
/// Each field is applied as `column = column + delta` in a single statement,
/// so concurrent adjustments commute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DealerDelta {
    pub loaned: Decimal,
    pub repaid: Decimal,
    pub active_loans: i64,
    pub reward_tokens: i64,
}

impl DealerDelta {
    pub fn loaned(amount: Decimal) -> Self {
        DealerDelta {
            loaned: amount,
            ..Default::default()
        }
    }

    pub fn repaid(amount: Decimal) -> Self {
        DealerDelta {
            repaid: amount,
            ..Default::default()
        }
    }

    pub fn active_loans(delta: i64) -> Self {
        DealerDelta {
            active_loans: delta,
            ..Default::default()
        }
    }

    pub fn reward_tokens(tokens: i64) -> Self {
        DealerDelta {
            reward_tokens: tokens,
            ..Default::default()
        }
    }

    /// Combine two adjustments into one.
    pub fn and(self, other: DealerDelta) -> Self {
        DealerDelta {
            loaned: self.loaned + other.loaned,
            repaid: self.repaid + other.repaid,
            active_loans: self.active_loans + other.active_loans,
            reward_tokens: self.reward_tokens + other.reward_tokens,
        }
    }

    /// Lifetime totals and token balances only grow. The active loan count
    /// may move either way.
    pub fn is_monotonic(&self) -> bool {
        !self.loaned.is_negative() && !self.repaid.is_negative() && self.reward_tokens >= 0
    }

    pub fn is_noop(&self) -> bool {
        self.loaned.is_zero()
            && self.repaid.is_zero()
            && self.active_loans == 0
            && self.reward_tokens == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dealer_status_roundtrip_strings() {
        for status in [
            DealerStatus::Pending,
            DealerStatus::Approved,
            DealerStatus::Suspended,
        ] {
            assert_eq!(status.as_str().parse::<DealerStatus>().unwrap(), status);
        }
        assert!("active".parse::<DealerStatus>().is_err());
    }

    #[test]
    fn test_patch_absent_fields_deserialize_as_none() {
        let patch: DealerPatch = serde_json::from_str(r#"{"phone": ""}"#).unwrap();
        assert_eq!(patch.phone.as_deref(), Some(""));
        assert!(patch.name.is_none());
        assert!(!patch.is_empty());
        assert!(DealerPatch::default().is_empty());
    }

    #[test]
    fn test_delta_combines() {
        let delta = DealerDelta::loaned(Decimal::from_units(1200))
            .and(DealerDelta::active_loans(1))
            .and(DealerDelta::reward_tokens(100));
        assert_eq!(delta.loaned, Decimal::from_units(1200));
        assert_eq!(delta.active_loans, 1);
        assert_eq!(delta.reward_tokens, 100);
        assert!(delta.repaid.is_zero());
        assert!(!delta.is_noop());
        assert!(DealerDelta::default().is_noop());
    }

    #[test]
    fn test_only_active_loans_may_decrease() {
        let payoff = DealerDelta::repaid(Decimal::from_units(700)).and(DealerDelta::active_loans(-1));
        assert!(payoff.is_monotonic());
        assert!(!DealerDelta::loaned(Decimal::from_units(-1)).is_monotonic());
        assert!(!DealerDelta::repaid(Decimal::from_units(-1)).is_monotonic());
        assert!(!DealerDelta::reward_tokens(-5).is_monotonic());
    }
}
