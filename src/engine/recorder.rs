//! The single write path for ledger transactions.

use crate::db::Repository;
use crate::domain::{
    Decimal, TimeMs, Transaction, TransactionFilter, TransactionStatus, TransactionType,
};
use crate::error::AppError;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

/// Default lookback for transaction listings.
pub const DEFAULT_LIST_DAYS: i64 = 90;
pub const DEFAULT_LIST_LIMIT: i64 = 100;
/// Entries shown on a dealer's own transaction history.
pub const DEALER_HISTORY_LIMIT: i64 = 50;
const SUMMARY_RECENT: usize = 10;

/// Source of opaque identifiers for things that live outside this system:
/// settlement references, NFC tags and collateral tokens.
pub trait ExternalRefGenerator: Send + Sync {
    fn transaction_ref(&self) -> String;
    fn nfc_tag_id(&self) -> String;
    fn token_id(&self) -> String;
}

/// Generates references from the SHA-256 of a fresh random UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomRefGenerator;

impl RandomRefGenerator {
    fn digest_hex() -> String {
        let seed = uuid::Uuid::new_v4();
        hex::encode(Sha256::digest(seed.as_bytes()))
    }
}

impl ExternalRefGenerator for RandomRefGenerator {
    fn transaction_ref(&self) -> String {
        format!("0x{}", Self::digest_hex())
    }

    fn nfc_tag_id(&self) -> String {
        format!("nfc_{}", &Self::digest_hex()[..16])
    }

    fn token_id(&self) -> String {
        format!("tok_{}", &Self::digest_hex()[..16])
    }
}

/// Fields of a transaction before it is stamped and identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub dealer_id: String,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub loan_id: Option<String>,
    pub method: Option<String>,
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub period_days: i64,
    pub total_transactions: usize,
    pub total_disbursed: Decimal,
    pub total_payments: Decimal,
    pub total_fees: Decimal,
    pub anvl_earned: Decimal,
    /// Disbursed minus repaid over the period.
    pub net_flow: Decimal,
    pub recent_transactions: Vec<Transaction>,
}

#[derive(Clone)]
pub struct TransactionRecorder {
    repo: Arc<Repository>,
    refs: Arc<dyn ExternalRefGenerator>,
}

impl TransactionRecorder {
    pub fn new(repo: Arc<Repository>, refs: Arc<dyn ExternalRefGenerator>) -> Self {
        Self { repo, refs }
    }

    pub fn refs(&self) -> &Arc<dyn ExternalRefGenerator> {
        &self.refs
    }

    /// Build a confirmed, timestamped transaction without storing it.
    ///
    /// On-chain types without a caller-supplied reference get a generated one.
    pub fn prepare(&self, draft: TransactionDraft, now: TimeMs) -> Result<Transaction, AppError> {
        let amount = draft.amount.round_minor();
        if !amount.is_positive() {
            return Err(AppError::InvalidInput(format!(
                "transaction amount must be positive, got {}",
                draft.amount
            )));
        }
        if !amount.fits_minor() {
            return Err(AppError::InvalidInput(format!(
                "transaction amount {} exceeds the largest storable amount",
                draft.amount
            )));
        }

        let tx_hash = match draft.external_ref {
            Some(external) => Some(external),
            None if draft.tx_type.is_on_chain() => Some(self.refs.transaction_ref()),
            None => None,
        };

        Ok(Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            dealer_id: draft.dealer_id,
            tx_type: draft.tx_type,
            amount,
            currency: draft.currency,
            loan_id: draft.loan_id,
            method: draft.method,
            tx_hash,
            status: TransactionStatus::Confirmed,
            timestamp: now,
        })
    }

    /// Record a standalone ledger entry.
    ///
    /// Fees are appended as they are. Rewards are appended together with the
    /// dealer's token increment. Disbursements and payments only arise from
    /// loan transitions and are rejected here.
    pub async fn record(&self, draft: TransactionDraft) -> Result<Transaction, AppError> {
        if !self.repo.dealer_exists(&draft.dealer_id).await? {
            return Err(AppError::NotFound(format!("dealer {}", draft.dealer_id)));
        }

        match draft.tx_type {
            TransactionType::LoanDisbursement | TransactionType::Payment => {
                Err(AppError::InvalidInput(format!(
                    "{} entries are recorded by loan transitions",
                    draft.tx_type
                )))
            }
            TransactionType::Fee => {
                let tx = self.prepare(draft, TimeMs::now())?;
                self.repo.insert_transaction(&tx).await?;
                info!(tx_id = %tx.id, dealer_id = %tx.dealer_id, amount = %tx.amount, "Fee recorded");
                Ok(tx)
            }
            TransactionType::AnvlReward => {
                let tx = self.prepare(draft, TimeMs::now())?;
                let tokens = whole_tokens(tx.amount)?;
                if !self.repo.commit_reward(&tx, tokens).await? {
                    return Err(AppError::NotFound(format!("dealer {}", tx.dealer_id)));
                }
                info!(tx_id = %tx.id, dealer_id = %tx.dealer_id, tokens, "Reward recorded");
                Ok(tx)
            }
        }
    }

    pub async fn get(&self, tx_id: &str) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", tx_id)))
    }

    /// Newest-first listing, bounded to the default window and limit when the
    /// filter leaves them open.
    pub async fn list(&self, mut filter: TransactionFilter) -> Result<Vec<Transaction>, AppError> {
        filter
            .since
            .get_or_insert_with(|| TimeMs::now().minus_days(DEFAULT_LIST_DAYS));
        filter.limit.get_or_insert(DEFAULT_LIST_LIMIT);
        Ok(self.repo.find_transactions(&filter).await?)
    }

    /// Full history of one loan, newest first.
    pub async fn for_loan(&self, loan_id: &str) -> Result<Vec<Transaction>, AppError> {
        Ok(self
            .repo
            .find_transactions(&TransactionFilter {
                loan_id: Some(loan_id.to_string()),
                ..Default::default()
            })
            .await?)
    }

    /// A dealer's most recent entries regardless of age.
    pub async fn for_dealer(&self, dealer_id: &str) -> Result<Vec<Transaction>, AppError> {
        Ok(self
            .repo
            .find_transactions(&TransactionFilter {
                dealer_id: Some(dealer_id.to_string()),
                limit: Some(DEALER_HISTORY_LIMIT),
                ..Default::default()
            })
            .await?)
    }

    pub async fn summary(&self, dealer_id: &str, days: i64) -> Result<TransactionSummary, AppError> {
        if days <= 0 {
            return Err(AppError::InvalidInput("days must be positive".into()));
        }
        let transactions = self
            .repo
            .find_transactions(&TransactionFilter {
                dealer_id: Some(dealer_id.to_string()),
                since: Some(TimeMs::now().minus_days(days)),
                ..Default::default()
            })
            .await?;

        let total_of = |kind: TransactionType| -> Decimal {
            transactions
                .iter()
                .filter(|t| t.tx_type == kind)
                .map(|t| t.amount)
                .sum()
        };
        let total_disbursed = total_of(TransactionType::LoanDisbursement);
        let total_payments = total_of(TransactionType::Payment);
        let total_fees = total_of(TransactionType::Fee);
        let anvl_earned = total_of(TransactionType::AnvlReward);

        Ok(TransactionSummary {
            period_days: days,
            total_transactions: transactions.len(),
            total_disbursed,
            total_payments,
            total_fees,
            anvl_earned,
            net_flow: total_disbursed - total_payments,
            recent_transactions: transactions.into_iter().take(SUMMARY_RECENT).collect(),
        })
    }
}

/// Token count carried by a reward amount. Rewards are whole tokens.
fn whole_tokens(amount: Decimal) -> Result<i64, AppError> {
    let inner = amount.inner();
    if inner.fract() != rust_decimal::Decimal::ZERO {
        return Err(AppError::InvalidInput(format!(
            "reward amount must be a whole number of tokens, got {}",
            amount
        )));
    }
    inner
        .to_i64()
        .ok_or_else(|| AppError::InvalidInput(format!("reward amount {} out of range", amount)))
}
