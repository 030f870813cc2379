pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;

pub use config::Config;
pub use db::{init_db, open_pool, Repository, StoreError};
pub use domain::{
    Audit, AuditStatus, Dealer, Decimal, GeoPoint, Loan, LoanStatus, Notification, TimeMs,
    Transaction, TransactionType, Vehicle, VehicleStatus, Vin, WalletAddress,
};
pub use engine::{
    ComplianceEvaluator, DealerAccounts, Inventory, LoanEngine, TransactionRecorder,
};
pub use error::AppError;
