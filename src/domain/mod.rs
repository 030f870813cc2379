//! Domain types for the floor-plan lending ledger.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper (minor-unit conversions)
//! - Primitives: TimeMs, WalletAddress, Vin, GeoPoint
//! - Entities: Dealer, Loan, Vehicle, Audit, Transaction, Notification
//! - Closed status enums with string mappings for storage

pub mod audit;
pub mod dealer;
pub mod decimal;
pub mod loan;
pub mod notification;
pub mod primitives;
pub mod transaction;
pub mod vehicle;

pub use audit::{Audit, AuditFilter, AuditRequest, AuditStatus};
pub use dealer::{Dealer, DealerDelta, DealerPatch, DealerStatus, NewDealer};
pub use decimal::Decimal;
pub use loan::{Loan, LoanFilter, LoanStatus, LoanTerms};
pub use notification::{Notification, Severity};
pub use primitives::{GeoPoint, PrimitiveParseError, TimeMs, UnknownVariant, Vin, WalletAddress};
pub use transaction::{Transaction, TransactionFilter, TransactionStatus, TransactionType};
pub use vehicle::{NewVehicle, Vehicle, VehicleFilter, VehiclePatch, VehicleStatus};
