//! Dealer accounts: onboarding, profile updates and the running totals
//! projected from loan events and ledger entries.

use crate::db::{Repository, StoreError};
use crate::domain::{
    Dealer, DealerPatch, Decimal, GeoPoint, NewDealer, Notification, TimeMs,
    Transaction, TransactionType, WalletAddress,
};
use crate::engine::lifecycle::APPROVAL_REWARD_TOKENS;
use crate::engine::recorder::{TransactionDraft, TransactionRecorder};
use crate::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Number of notifications returned by a listing.
pub const NOTIFICATION_LIST_LIMIT: i64 = 20;
const REWARD_CURRENCY: &str = "ANVL";

/// A dealer's running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountTotals {
    pub total_loaned: Decimal,
    pub total_repaid: Decimal,
    pub active_loans: i64,
    pub anvl_tokens: i64,
}

impl AccountTotals {
    fn of(dealer: &Dealer) -> Self {
        AccountTotals {
            total_loaned: dealer.total_loaned,
            total_repaid: dealer.total_repaid,
            active_loans: dealer.active_loans,
            anvl_tokens: dealer.anvl_tokens,
        }
    }
}

/// Live counters beside the same totals recomputed from the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub dealer_id: String,
    pub live: AccountTotals,
    pub ledger: AccountTotals,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct DealerAccounts {
    repo: Arc<Repository>,
    recorder: TransactionRecorder,
}

impl DealerAccounts {
    pub fn new(repo: Arc<Repository>, recorder: TransactionRecorder) -> Self {
        Self { repo, recorder }
    }

    /// Return the dealer owning a wallet, creating a pending profile on first
    /// connection.
    pub async fn connect_wallet(&self, profile: NewDealer) -> Result<Dealer, AppError> {
        let now = TimeMs::now();
        if let Some(existing) = self.repo.get_dealer_by_wallet(&profile.wallet_address).await? {
            self.repo.touch_dealer(&existing.id, now).await?;
            info!(dealer_id = %existing.id, "Wallet reconnected");
            return self.get(&existing.id).await;
        }

        let wallet = profile.wallet_address.clone();
        let dealer = Dealer::onboard(profile, now);
        match self.repo.insert_dealer(&dealer).await {
            Ok(()) => {
                info!(dealer_id = %dealer.id, wallet = %dealer.wallet_address, "Dealer onboarded");
                Ok(dealer)
            }
            // Lost a race with a concurrent first connection for the same wallet.
            Err(StoreError::Conflict(msg)) => match self.repo.get_dealer_by_wallet(&wallet).await? {
                Some(existing) => Ok(existing),
                None => Err(AppError::Conflict(msg)),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, dealer_id: &str) -> Result<Dealer, AppError> {
        self.repo
            .get_dealer(dealer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dealer {}", dealer_id)))
    }

    pub async fn get_by_wallet(&self, wallet: &str) -> Result<Dealer, AppError> {
        let wallet: WalletAddress = wallet.parse()?;
        self.repo
            .get_dealer_by_wallet(&wallet)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dealer with wallet {}", wallet)))
    }

    pub async fn update(&self, dealer_id: &str, patch: &DealerPatch) -> Result<Dealer, AppError> {
        if let Some(lot) = patch.lot_location {
            GeoPoint::new(lot.lat, lot.lng)?;
        }
        if !self
            .repo
            .update_dealer(dealer_id, patch, TimeMs::now())
            .await?
        {
            return Err(AppError::NotFound(format!("dealer {}", dealer_id)));
        }
        info!(dealer_id, "Dealer profile updated");
        self.get(dealer_id).await
    }

    /// Credit reward tokens through a recorded `anvl_reward` entry.
    pub async fn award_tokens(
        &self,
        dealer_id: &str,
        tokens: i64,
        reason: &str,
    ) -> Result<Transaction, AppError> {
        if tokens <= 0 {
            return Err(AppError::InvalidInput("tokens must be positive".into()));
        }
        let tx = self
            .recorder
            .record(TransactionDraft {
                dealer_id: dealer_id.to_string(),
                tx_type: TransactionType::AnvlReward,
                amount: Decimal::from_units(tokens),
                currency: REWARD_CURRENCY.to_string(),
                loan_id: None,
                method: None,
                external_ref: None,
            })
            .await?;
        info!(dealer_id, tokens, reason, "Tokens awarded");
        Ok(tx)
    }

    /// Recompute a dealer's totals from the ledger and compare them with the
    /// live counters.
    ///
    /// Tokens expected from the ledger are the recorded rewards plus the fixed
    /// bonus of every approved loan.
    pub async fn reconcile(&self, dealer_id: &str) -> Result<Reconciliation, AppError> {
        let dealer = self.get(dealer_id).await?;
        let sums = self.repo.ledger_totals(dealer_id).await?;
        let counts = self.repo.loan_counts(dealer_id).await?;

        let ledger = AccountTotals {
            total_loaned: sums.disbursed,
            total_repaid: sums.repaid,
            active_loans: counts.outstanding,
            anvl_tokens: sums.reward_tokens + counts.approved * APPROVAL_REWARD_TOKENS,
        };
        let live = AccountTotals::of(&dealer);
        let consistent = live == ledger;
        if !consistent {
            warn!(dealer_id, ?live, ?ledger, "Dealer totals diverge from ledger");
        }

        Ok(Reconciliation {
            dealer_id: dealer.id,
            live,
            ledger,
            consistent,
        })
    }

    /// The dealer's newest notifications.
    pub async fn notifications(&self, dealer_id: &str) -> Result<Vec<Notification>, AppError> {
        if !self.repo.dealer_exists(dealer_id).await? {
            return Err(AppError::NotFound(format!("dealer {}", dealer_id)));
        }
        Ok(self
            .repo
            .find_notifications(dealer_id, NOTIFICATION_LIST_LIMIT)
            .await?)
    }

    pub async fn mark_read(&self, dealer_id: &str, notification_id: &str) -> Result<(), AppError> {
        if !self
            .repo
            .mark_notification_read(dealer_id, notification_id)
            .await?
        {
            return Err(AppError::NotFound(format!(
                "notification {} for dealer {}",
                notification_id, dealer_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_test_db;
    use crate::domain::{DealerDelta, DealerStatus};
    use crate::engine::recorder::RandomRefGenerator;

    fn accounts(repo: Repository) -> DealerAccounts {
        let repo = Arc::new(repo);
        let recorder = TransactionRecorder::new(repo.clone(), Arc::new(RandomRefGenerator));
        DealerAccounts::new(repo, recorder)
    }

    fn profile(wallet: &str, email: &str) -> NewDealer {
        NewDealer {
            wallet_address: wallet.parse().unwrap(),
            name: "Sunset Motors".to_string(),
            address: "9 Sunset Blvd".to_string(),
            phone: "555-0199".to_string(),
            email: email.to_string(),
            lot_location: None,
        }
    }

    #[tokio::test]
    async fn test_connect_wallet_is_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let accounts = accounts(repo);

        let first = accounts
            .connect_wallet(profile("0xAbC123", "s@example.com"))
            .await
            .unwrap();
        assert_eq!(first.kyc_status, DealerStatus::Pending);
        assert_eq!(first.active_loans, 0);

        let again = accounts
            .connect_wallet(profile("0xabc123", "other@example.com"))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.email, "s@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let (repo, _temp) = setup_test_db().await;
        let accounts = accounts(repo);
        accounts
            .connect_wallet(profile("0x01", "s@example.com"))
            .await
            .unwrap();
        let err = accounts
            .connect_wallet(profile("0x02", "s@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_award_is_recorded_and_credited() {
        let (repo, _temp) = setup_test_db().await;
        let accounts = accounts(repo);
        let dealer = accounts
            .connect_wallet(profile("0x01", "s@example.com"))
            .await
            .unwrap();

        let tx = accounts.award_tokens(&dealer.id, 10, "referral").await.unwrap();
        assert_eq!(tx.tx_type, TransactionType::AnvlReward);
        assert_eq!(tx.currency, REWARD_CURRENCY);
        accounts.award_tokens(&dealer.id, 5, "survey").await.unwrap();

        let fetched = accounts.get(&dealer.id).await.unwrap();
        assert_eq!(fetched.anvl_tokens, 15);
        assert!(fetched.total_loaned.is_zero());
        assert_eq!(fetched.active_loans, 0);

        let err = accounts.award_tokens(&dealer.id, -5, "clawback").await;
        assert!(matches!(err, Err(AppError::InvalidInput(_))));
        let err = accounts.award_tokens("missing", 1, "referral").await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reconcile_detects_untracked_adjustment() {
        let (repo, _temp) = setup_test_db().await;
        let accounts = accounts(repo);
        let dealer = accounts
            .connect_wallet(profile("0x01", "s@example.com"))
            .await
            .unwrap();

        accounts.award_tokens(&dealer.id, 10, "referral").await.unwrap();
        assert!(accounts.reconcile(&dealer.id).await.unwrap().consistent);

        // A bare counter bump has no ledger entry behind it.
        accounts
            .repo
            .apply_dealer_delta(
                &dealer.id,
                &DealerDelta::loaned(Decimal::from_units(50)),
                TimeMs::now(),
            )
            .await
            .unwrap();
        let report = accounts.reconcile(&dealer.id).await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.live.total_loaned, Decimal::from_units(50));
        assert!(report.ledger.total_loaned.is_zero());
    }

    #[tokio::test]
    async fn test_mark_read_requires_matching_dealer() {
        let (repo, _temp) = setup_test_db().await;
        let accounts = accounts(repo);
        let dealer = accounts
            .connect_wallet(profile("0x01", "s@example.com"))
            .await
            .unwrap();
        let err = accounts.mark_read(&dealer.id, "nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(accounts.notifications(&dealer.id).await.unwrap().is_empty());
    }
}
