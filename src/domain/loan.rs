//! Inventory-financing loan record.

use crate::domain::{Decimal, TimeMs, UnknownVariant};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Loan lifecycle state.
///
/// `Pending -> Active -> {Paid | Overdue}`, with `Overdue <-> Active`.
/// `Paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Active,
    Paid,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Active => "active",
            LoanStatus::Paid => "paid",
            LoanStatus::Overdue => "overdue",
        }
    }

    /// Whether the loan counts towards a dealer's `active_loans`.
    pub fn is_outstanding(&self) -> bool {
        match self {
            LoanStatus::Active | LoanStatus::Overdue => true,
            LoanStatus::Pending | LoanStatus::Paid => false,
        }
    }
}

impl FromStr for LoanStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "active" => Ok(LoanStatus::Active),
            "paid" => Ok(LoanStatus::Paid),
            "overdue" => Ok(LoanStatus::Overdue),
            other => Err(UnknownVariant::new("loan status", other)),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loan to a dealer, secured by financed vehicles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub dealer_id: String,
    pub amount: Decimal,
    pub currency: String,
    /// Annual rate in percent.
    pub interest_rate: Decimal,
    pub flat_fee: Decimal,
    pub term_months: u32,
    pub status: LoanStatus,
    pub remaining_balance: Decimal,
    pub vehicles_financed: u32,
    pub start_date: Option<TimeMs>,
    pub next_payment_due: Option<TimeMs>,
    pub next_payment_amount: Option<Decimal>,
    pub paid_off_date: Option<TimeMs>,
    /// Optimistic-concurrency counter, bumped by every stored transition.
    #[serde(skip)]
    pub version: i64,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Loan {
    /// A new application: pending, unstarted, owing the full principal.
    pub fn originate(terms: LoanTerms, now: TimeMs) -> Self {
        Loan {
            id: uuid::Uuid::new_v4().to_string(),
            dealer_id: terms.dealer_id,
            amount: terms.amount,
            currency: terms.currency,
            interest_rate: terms.interest_rate,
            flat_fee: terms.flat_fee,
            term_months: terms.term_months,
            status: LoanStatus::Pending,
            remaining_balance: terms.amount,
            vehicles_financed: terms.vehicles_financed,
            start_date: None,
            next_payment_due: None,
            next_payment_amount: None,
            paid_off_date: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount repaid so far.
    pub fn repaid(&self) -> Decimal {
        self.amount - self.remaining_balance
    }
}

/// Terms of a loan application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanTerms {
    pub dealer_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub interest_rate: Decimal,
    pub flat_fee: Decimal,
    pub term_months: u32,
    pub vehicles_financed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub dealer_id: Option<String>,
    pub status: Option<LoanStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> LoanTerms {
        LoanTerms {
            dealer_id: "dealer-1".to_string(),
            amount: Decimal::from_minor(120_000),
            currency: "USDC".to_string(),
            interest_rate: Decimal::from_units(9),
            flat_fee: Decimal::from_units(50),
            term_months: 6,
            vehicles_financed: 3,
        }
    }

    #[test]
    fn test_originate_is_pending_with_full_balance() {
        let loan = Loan::originate(terms(), TimeMs::new(1_000));
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.remaining_balance, loan.amount);
        assert!(loan.start_date.is_none());
        assert!(loan.repaid().is_zero());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(LoanStatus::Overdue.to_string(), "overdue");
        assert_eq!("paid".parse::<LoanStatus>().unwrap(), LoanStatus::Paid);
        assert!("closed".parse::<LoanStatus>().is_err());
        let json = serde_json::to_string(&LoanStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
    }

    #[test]
    fn test_outstanding_states() {
        assert!(LoanStatus::Active.is_outstanding());
        assert!(LoanStatus::Overdue.is_outstanding());
        assert!(!LoanStatus::Pending.is_outstanding());
        assert!(!LoanStatus::Paid.is_outstanding());
    }
}
