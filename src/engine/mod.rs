//! Business engines over the repository.
//!
//! - `lifecycle` - Loan state machine and its ledger consequences
//! - `amortization` - Pure installment arithmetic
//! - `compliance` - Collateral location audits and reporting
//! - `recorder` - The single write path for transactions
//! - `accounts` - Dealer onboarding and running totals
//! - `inventory` - Vehicle collateral records

pub mod accounts;
pub mod amortization;
pub mod compliance;
pub mod inventory;
pub mod lifecycle;
pub mod recorder;

pub use accounts::{AccountTotals, DealerAccounts, Reconciliation};
pub use compliance::{ComplianceEvaluator, ComplianceReport};
pub use inventory::Inventory;
pub use lifecycle::{LoanEngine, PaymentReceipt};
pub use recorder::{
    ExternalRefGenerator, RandomRefGenerator, TransactionDraft, TransactionRecorder,
    TransactionSummary,
};
