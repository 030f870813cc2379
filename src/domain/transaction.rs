//! Append-only ledger entries.

use crate::domain::{Decimal, TimeMs, UnknownVariant};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    LoanDisbursement,
    Payment,
    AnvlReward,
    Fee,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::LoanDisbursement => "loan_disbursement",
            TransactionType::Payment => "payment",
            TransactionType::AnvlReward => "anvl_reward",
            TransactionType::Fee => "fee",
        }
    }

    /// Whether the entry mirrors an on-chain event and so carries an external reference.
    pub fn is_on_chain(&self) -> bool {
        match self {
            TransactionType::LoanDisbursement | TransactionType::AnvlReward => true,
            TransactionType::Payment | TransactionType::Fee => false,
        }
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loan_disbursement" => Ok(TransactionType::LoanDisbursement),
            "payment" => Ok(TransactionType::Payment),
            "anvl_reward" => Ok(TransactionType::AnvlReward),
            "fee" => Ok(TransactionType::Fee),
            other => Err(UnknownVariant::new("transaction type", other)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement status. Entries are confirmed on write since no external
/// settlement is awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Confirmed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Confirmed => "confirmed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(TransactionStatus::Confirmed),
            other => Err(UnknownVariant::new("transaction status", other)),
        }
    }
}

/// An immutable ledger fact. Created once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub dealer_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub status: TransactionStatus,
    pub timestamp: TimeMs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub dealer_id: Option<String>,
    pub loan_id: Option<String>,
    pub tx_type: Option<TransactionType>,
    pub since: Option<TimeMs>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_chain_types() {
        assert!(TransactionType::LoanDisbursement.is_on_chain());
        assert!(TransactionType::AnvlReward.is_on_chain());
        assert!(!TransactionType::Payment.is_on_chain());
        assert!(!TransactionType::Fee.is_on_chain());
    }

    #[test]
    fn test_transaction_serializes_type_field() {
        let tx = Transaction {
            id: "t1".to_string(),
            dealer_id: "d1".to_string(),
            tx_type: TransactionType::Payment,
            amount: Decimal::from_minor(50_000),
            currency: "USDC".to_string(),
            loan_id: Some("l1".to_string()),
            method: Some("ACH".to_string()),
            tx_hash: None,
            status: TransactionStatus::Confirmed,
            timestamp: TimeMs::new(1),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "payment");
        assert_eq!(json["status"], "confirmed");
        assert!(json.get("tx_hash").is_none());
    }
}
