//! Loan state machine.
//!
//! Every transition re-reads the loan, plans the next state as a pure step,
//! and commits it with a compare-and-set on the loan version together with its
//! ledger entry, dealer adjustment and notification. A lost compare-and-set is
//! re-planned against the fresh row, so concurrent payments never apply
//! against a stale balance.

use crate::db::{LoanEvent, Repository};
use crate::domain::{
    DealerDelta, Decimal, Loan, LoanFilter, LoanStatus, LoanTerms, Notification, Severity, TimeMs,
    Transaction, TransactionType,
};
use crate::engine::amortization::{
    clamp_payment, first_installment, installment_after_payment, next_due_date,
};
use crate::engine::recorder::{TransactionDraft, TransactionRecorder};
use crate::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tokens credited to a dealer when one of their loans is approved.
pub const APPROVAL_REWARD_TOKENS: i64 = 100;
pub const DEFAULT_PAYMENT_METHOD: &str = "ACH";
/// Compare-and-set attempts before a transition gives up with `Conflict`.
const MAX_CAS_ATTEMPTS: u32 = 3;

/// The planned outcome of one transition, before identifiers and hashes are
/// assigned.
struct Plan {
    next: Loan,
    transaction: Option<TransactionDraft>,
    delta: Option<DealerDelta>,
    notification: Option<Notification>,
}

impl Plan {
    fn status_only(next: Loan) -> Self {
        Plan {
            next,
            transaction: None,
            delta: None,
            notification: None,
        }
    }
}

/// A committed payment and the ledger entry it produced.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub loan: Loan,
    pub transaction: Transaction,
}

impl PaymentReceipt {
    /// The amount actually applied after clamping.
    pub fn applied(&self) -> Decimal {
        self.transaction.amount
    }
}

#[derive(Clone)]
pub struct LoanEngine {
    repo: Arc<Repository>,
    recorder: TransactionRecorder,
}

impl LoanEngine {
    pub fn new(repo: Arc<Repository>, recorder: TransactionRecorder) -> Self {
        Self { repo, recorder }
    }

    /// Create a pending loan. No funds move, so nothing is recorded.
    pub async fn originate(&self, terms: LoanTerms) -> Result<Loan, AppError> {
        let terms = LoanTerms {
            amount: terms.amount.round_minor(),
            flat_fee: terms.flat_fee.round_minor(),
            ..terms
        };
        if !terms.amount.is_positive() {
            return Err(AppError::InvalidInput(format!(
                "loan amount must be positive, got {}",
                terms.amount
            )));
        }
        if terms.term_months == 0 {
            return Err(AppError::InvalidInput("term must be at least one month".into()));
        }
        if terms.interest_rate.is_negative() || terms.flat_fee.is_negative() {
            return Err(AppError::InvalidInput(
                "interest rate and flat fee must not be negative".into(),
            ));
        }
        if !terms.amount.fits_minor() || !terms.flat_fee.fits_minor() {
            return Err(AppError::InvalidInput(format!(
                "loan amount {} or fee {} exceeds the largest storable amount",
                terms.amount, terms.flat_fee
            )));
        }
        if terms.currency.trim().is_empty() {
            return Err(AppError::InvalidInput("currency must not be empty".into()));
        }
        if !self.repo.dealer_exists(&terms.dealer_id).await? {
            return Err(AppError::NotFound(format!("dealer {}", terms.dealer_id)));
        }

        let loan = Loan::originate(terms, TimeMs::now());
        self.repo.insert_loan(&loan).await?;
        info!(
            loan_id = %loan.id,
            dealer_id = %loan.dealer_id,
            amount = %loan.amount,
            term_months = loan.term_months,
            "Loan originated"
        );
        Ok(loan)
    }

    /// Activate a pending loan, disburse the principal and reward the dealer.
    pub async fn approve(&self, loan_id: &str) -> Result<Loan, AppError> {
        let (loan, _) = self
            .transition(loan_id, "approve", |loan, now| {
                if loan.status != LoanStatus::Pending {
                    return Err(AppError::InvalidState(format!(
                        "loan {} is {}, only pending loans can be approved",
                        loan.id, loan.status
                    )));
                }
                let installment = first_installment(loan.remaining_balance, loan.term_months)
                    .ok_or_else(|| {
                        AppError::InvalidInput(format!("loan {} has a zero term", loan.id))
                    })?;

                let mut next = loan.clone();
                next.status = LoanStatus::Active;
                next.start_date = Some(now);
                next.next_payment_due = Some(next_due_date(now));
                next.next_payment_amount = Some(installment);

                Ok(Plan {
                    transaction: Some(TransactionDraft {
                        dealer_id: loan.dealer_id.clone(),
                        tx_type: TransactionType::LoanDisbursement,
                        amount: loan.amount,
                        currency: loan.currency.clone(),
                        loan_id: Some(loan.id.clone()),
                        method: None,
                        external_ref: None,
                    }),
                    delta: Some(
                        DealerDelta::loaned(loan.amount)
                            .and(DealerDelta::active_loans(1))
                            .and(DealerDelta::reward_tokens(APPROVAL_REWARD_TOKENS)),
                    ),
                    notification: Some(Notification::new(
                        &loan.dealer_id,
                        "loan_approved",
                        "Loan Approved",
                        format!(
                            "Loan of {} {} approved and disbursed",
                            loan.amount, loan.currency
                        ),
                        Severity::Info,
                        now,
                    )),
                    next,
                })
            })
            .await?;
        Ok(loan)
    }

    /// Apply a payment to an active loan.
    ///
    /// Amounts above the outstanding balance are capped to it, never rejected.
    pub async fn apply_payment(
        &self,
        loan_id: &str,
        amount: Decimal,
        method: Option<String>,
    ) -> Result<PaymentReceipt, AppError> {
        if !amount.round_minor().is_positive() {
            return Err(AppError::InvalidInput(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        let method = method
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());

        let (loan, transaction) = self
            .transition(loan_id, "apply_payment", |loan, now| {
                if loan.status != LoanStatus::Active {
                    return Err(AppError::InvalidState(format!(
                        "loan {} is {}, payments apply to active loans only",
                        loan.id, loan.status
                    )));
                }
                let applied = clamp_payment(amount, loan.remaining_balance);
                let new_balance = loan.remaining_balance - applied;

                let mut next = loan.clone();
                next.remaining_balance = new_balance;
                let mut delta = DealerDelta::repaid(applied);
                let mut notification = None;

                if new_balance.is_zero() {
                    next.status = LoanStatus::Paid;
                    next.paid_off_date = Some(now);
                    next.next_payment_due = None;
                    next.next_payment_amount = None;
                    delta = delta.and(DealerDelta::active_loans(-1));
                    notification = Some(Notification::new(
                        &loan.dealer_id,
                        "loan_paid_off",
                        "Loan Paid Off",
                        format!("Loan {} has been paid in full", loan.id),
                        Severity::Info,
                        now,
                    ));
                } else {
                    next.next_payment_due = Some(next_due_date(now));
                    next.next_payment_amount =
                        Some(installment_after_payment(new_balance, loan.term_months));
                }

                Ok(Plan {
                    next,
                    transaction: Some(TransactionDraft {
                        dealer_id: loan.dealer_id.clone(),
                        tx_type: TransactionType::Payment,
                        amount: applied,
                        currency: loan.currency.clone(),
                        loan_id: Some(loan.id.clone()),
                        method: Some(method.clone()),
                        external_ref: None,
                    }),
                    delta: Some(delta),
                    notification,
                })
            })
            .await?;

        let transaction = transaction.ok_or_else(|| {
            AppError::Internal(format!("payment on loan {} produced no transaction", loan_id))
        })?;
        Ok(PaymentReceipt { loan, transaction })
    }

    /// Move an active loan whose installment was due before `as_of` to overdue.
    pub async fn mark_overdue(&self, loan_id: &str, as_of: TimeMs) -> Result<Loan, AppError> {
        let (loan, _) = self
            .transition(loan_id, "mark_overdue", |loan, now| {
                if loan.status != LoanStatus::Active {
                    return Err(AppError::InvalidState(format!(
                        "loan {} is {}, only active loans become overdue",
                        loan.id, loan.status
                    )));
                }
                match loan.next_payment_due {
                    Some(due) if as_of > due => {}
                    _ => {
                        return Err(AppError::InvalidState(format!(
                            "loan {} is not past due",
                            loan.id
                        )))
                    }
                }

                let mut next = loan.clone();
                next.status = LoanStatus::Overdue;
                let mut plan = Plan::status_only(next);
                plan.notification = Some(Notification::new(
                    &loan.dealer_id,
                    "payment_overdue",
                    "Payment Overdue",
                    format!(
                        "Payment of {} {} on loan {} is overdue",
                        loan.next_payment_amount.unwrap_or_default(),
                        loan.currency,
                        loan.id
                    ),
                    Severity::Error,
                    now,
                ));
                Ok(plan)
            })
            .await?;
        Ok(loan)
    }

    /// Return an overdue loan to active. A due date already passed at `as_of`
    /// is pushed one payment interval past `as_of`.
    pub async fn reinstate(&self, loan_id: &str, as_of: TimeMs) -> Result<Loan, AppError> {
        let (loan, _) = self
            .transition(loan_id, "reinstate", |loan, _now| {
                if loan.status != LoanStatus::Overdue {
                    return Err(AppError::InvalidState(format!(
                        "loan {} is {}, only overdue loans can be reinstated",
                        loan.id, loan.status
                    )));
                }
                let mut next = loan.clone();
                next.status = LoanStatus::Active;
                if loan.next_payment_due.map_or(true, |due| as_of > due) {
                    next.next_payment_due = Some(next_due_date(as_of));
                }
                Ok(Plan::status_only(next))
            })
            .await?;
        Ok(loan)
    }

    /// Mark every active loan past due at `as_of` overdue. Returns the ids
    /// that were moved.
    pub async fn sweep_overdue(&self, as_of: TimeMs) -> Result<Vec<String>, AppError> {
        let candidates = self.repo.find_loans_past_due(as_of).await?;
        let mut moved = Vec::with_capacity(candidates.len());
        for loan in candidates {
            match self.mark_overdue(&loan.id, as_of).await {
                Ok(updated) => moved.push(updated.id),
                // Paid or re-scheduled since the scan.
                Err(AppError::InvalidState(reason)) => {
                    debug!(loan_id = %loan.id, %reason, "Skipping loan in overdue sweep")
                }
                Err(e) => return Err(e),
            }
        }
        info!(as_of = as_of.as_ms(), count = moved.len(), "Overdue sweep finished");
        Ok(moved)
    }

    pub async fn get(&self, loan_id: &str) -> Result<Loan, AppError> {
        self.repo
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("loan {}", loan_id)))
    }

    pub async fn list(&self, filter: &LoanFilter) -> Result<Vec<Loan>, AppError> {
        Ok(self.repo.find_loans(filter).await?)
    }

    pub async fn list_by_dealer(&self, dealer_id: &str) -> Result<Vec<Loan>, AppError> {
        self.list(&LoanFilter {
            dealer_id: Some(dealer_id.to_string()),
            status: None,
        })
        .await
    }

    pub async fn list_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, AppError> {
        self.list(&LoanFilter {
            dealer_id: None,
            status: Some(status),
        })
        .await
    }

    /// Ledger entries for one loan, newest first.
    pub async fn transactions_for_loan(&self, loan_id: &str) -> Result<Vec<Transaction>, AppError> {
        let loan = self.get(loan_id).await?;
        self.recorder.for_loan(&loan.id).await
    }

    async fn transition<F>(
        &self,
        loan_id: &str,
        op: &'static str,
        plan: F,
    ) -> Result<(Loan, Option<Transaction>), AppError>
    where
        F: Fn(&Loan, TimeMs) -> Result<Plan, AppError>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.get(loan_id).await?;
            let now = TimeMs::now();
            let Plan {
                mut next,
                transaction,
                delta,
                notification,
            } = plan(&current, now)?;
            next.updated_at = now;
            let transaction = transaction
                .map(|draft| self.recorder.prepare(draft, now))
                .transpose()?;

            let event = LoanEvent {
                expected_version: current.version,
                loan: &next,
                transaction: transaction.as_ref(),
                dealer_delta: delta,
                notification: notification.as_ref(),
            };
            if self.repo.commit_loan_event(&event).await? {
                next.version = current.version + 1;
                info!(
                    loan_id,
                    op,
                    from = %current.status,
                    to = %next.status,
                    remaining_balance = %next.remaining_balance,
                    "Loan transition committed"
                );
                return Ok((next, transaction));
            }
            warn!(loan_id, op, attempt, "Loan modified concurrently, re-reading");
        }
        Err(AppError::Conflict(format!(
            "loan {} is being modified concurrently, retry the request",
            loan_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{seed_dealer, setup_test_db};
    use crate::engine::recorder::RandomRefGenerator;

    async fn engine_with_dealer() -> (LoanEngine, Arc<Repository>, String, tempfile::TempDir) {
        let (repo, temp) = setup_test_db().await;
        let dealer = seed_dealer(&repo, "0xabc1", "a@example.com").await;
        let repo = Arc::new(repo);
        let recorder = TransactionRecorder::new(repo.clone(), Arc::new(RandomRefGenerator));
        (LoanEngine::new(repo.clone(), recorder), repo, dealer.id, temp)
    }

    fn terms(dealer_id: &str, amount: i64, term_months: u32) -> LoanTerms {
        LoanTerms {
            dealer_id: dealer_id.to_string(),
            amount: Decimal::from_units(amount),
            currency: "USDC".to_string(),
            interest_rate: Decimal::from_units(9),
            flat_fee: Decimal::from_units(50),
            term_months,
            vehicles_financed: 2,
        }
    }

    #[tokio::test]
    async fn test_originate_validates_input() {
        let (engine, _repo, dealer_id, _temp) = engine_with_dealer().await;

        let err = engine.originate(terms(&dealer_id, 0, 6)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = engine.originate(terms(&dealer_id, 100, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = engine.originate(terms("missing", 100, 6)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let loan = engine.originate(terms(&dealer_id, 1200, 6)).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert!(engine.transactions_for_loan(&loan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_sets_schedule_and_rejects_second_approval() {
        let (engine, repo, dealer_id, _temp) = engine_with_dealer().await;
        let loan = engine.originate(terms(&dealer_id, 1200, 6)).await.unwrap();

        let active = engine.approve(&loan.id).await.unwrap();
        assert_eq!(active.status, LoanStatus::Active);
        assert_eq!(active.next_payment_amount, Some(Decimal::from_units(200)));
        let start = active.start_date.unwrap();
        assert_eq!(active.next_payment_due, Some(start.plus_days(30)));

        let err = engine.approve(&loan.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let dealer = repo.get_dealer(&dealer_id).await.unwrap().unwrap();
        assert_eq!(dealer.total_loaned, Decimal::from_units(1200));
        assert_eq!(dealer.active_loans, 1);
        assert_eq!(dealer.anvl_tokens, APPROVAL_REWARD_TOKENS);

        let notes = repo.find_notifications(&dealer_id, 20).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_payment_on_pending_loan_is_invalid_state() {
        let (engine, _repo, dealer_id, _temp) = engine_with_dealer().await;
        let loan = engine.originate(terms(&dealer_id, 1200, 6)).await.unwrap();
        let err = engine
            .apply_payment(&loan.id, Decimal::from_units(100), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let err = engine
            .apply_payment(&loan.id, Decimal::zero(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_partial_payment_reschedules() {
        let (engine, _repo, dealer_id, _temp) = engine_with_dealer().await;
        let loan = engine.originate(terms(&dealer_id, 1200, 6)).await.unwrap();
        engine.approve(&loan.id).await.unwrap();

        let receipt = engine
            .apply_payment(&loan.id, Decimal::from_units(500), None)
            .await
            .unwrap();
        assert_eq!(receipt.applied(), Decimal::from_units(500));
        assert_eq!(receipt.transaction.method.as_deref(), Some("ACH"));
        assert_eq!(receipt.loan.status, LoanStatus::Active);
        assert_eq!(receipt.loan.remaining_balance, Decimal::from_units(700));
        assert_eq!(receipt.loan.next_payment_amount, Some(Decimal::from_units(140)));
    }

    #[tokio::test]
    async fn test_overpayment_is_clamped_and_pays_off() {
        let (engine, repo, dealer_id, _temp) = engine_with_dealer().await;
        let loan = engine.originate(terms(&dealer_id, 1000, 6)).await.unwrap();
        engine.approve(&loan.id).await.unwrap();

        let receipt = engine
            .apply_payment(&loan.id, Decimal::from_units(5000), Some("wire".into()))
            .await
            .unwrap();
        assert_eq!(receipt.applied(), Decimal::from_units(1000));
        assert_eq!(receipt.loan.status, LoanStatus::Paid);
        assert!(receipt.loan.remaining_balance.is_zero());
        assert!(receipt.loan.paid_off_date.is_some());
        assert!(receipt.loan.next_payment_due.is_none());
        assert!(receipt.loan.next_payment_amount.is_none());

        let dealer = repo.get_dealer(&dealer_id).await.unwrap().unwrap();
        assert_eq!(dealer.total_repaid, Decimal::from_units(1000));
        assert_eq!(dealer.active_loans, 0);

        let err = engine
            .apply_payment(&loan.id, Decimal::from_units(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_overdue_and_reinstate() {
        let (engine, repo, dealer_id, _temp) = engine_with_dealer().await;
        let loan = engine.originate(terms(&dealer_id, 1200, 6)).await.unwrap();
        let active = engine.approve(&loan.id).await.unwrap();
        let due = active.next_payment_due.unwrap();

        let err = engine.mark_overdue(&loan.id, due).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let late = due.plus_days(1);
        let overdue = engine.mark_overdue(&loan.id, late).await.unwrap();
        assert_eq!(overdue.status, LoanStatus::Overdue);
        assert_eq!(overdue.remaining_balance, active.remaining_balance);

        let err = engine
            .apply_payment(&loan.id, Decimal::from_units(10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let back = engine.reinstate(&loan.id, late).await.unwrap();
        assert_eq!(back.status, LoanStatus::Active);
        assert_eq!(back.next_payment_due, Some(late.plus_days(30)));

        let err = engine.reinstate(&loan.id, late).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let dealer = repo.get_dealer(&dealer_id).await.unwrap().unwrap();
        assert_eq!(dealer.active_loans, 1, "overdue loans stay outstanding");
    }

    #[tokio::test]
    async fn test_sweep_only_moves_past_due_active_loans() {
        let (engine, _repo, dealer_id, _temp) = engine_with_dealer().await;
        let pending = engine.originate(terms(&dealer_id, 500, 6)).await.unwrap();
        let a = engine.originate(terms(&dealer_id, 1200, 6)).await.unwrap();
        let active = engine.approve(&a.id).await.unwrap();
        let due = active.next_payment_due.unwrap();

        assert!(engine.sweep_overdue(due).await.unwrap().is_empty());

        let moved = engine.sweep_overdue(due.plus_days(2)).await.unwrap();
        assert_eq!(moved, vec![a.id.clone()]);
        assert_eq!(engine.get(&pending.id).await.unwrap().status, LoanStatus::Pending);
        assert_eq!(
            engine.list_by_status(LoanStatus::Overdue).await.unwrap().len(),
            1
        );
        assert_eq!(engine.list_by_dealer(&dealer_id).await.unwrap().len(), 2);
    }
}
