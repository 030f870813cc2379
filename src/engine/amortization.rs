//! Installment arithmetic for the loan state machine.
//!
//! All functions are pure and work on minor-unit-rounded `Decimal` values.

use crate::domain::{Decimal, TimeMs};

/// Days between scheduled installments.
pub const PAYMENT_INTERVAL_DAYS: i64 = 30;

/// Due date of the next installment counted from `now`.
pub fn next_due_date(now: TimeMs) -> TimeMs {
    now.plus_days(PAYMENT_INTERVAL_DAYS)
}

/// First installment: the balance spread evenly over the full term.
///
/// Returns `None` for a zero term.
pub fn first_installment(balance: Decimal, term_months: u32) -> Option<Decimal> {
    if term_months == 0 {
        return None;
    }
    balance
        .checked_div(Decimal::from(term_months))
        .map(|d| d.round_minor())
}

/// Installment after a partial payment: the new balance over one fewer
/// period (at least one), never more than the balance itself.
///
/// The remaining period count is not tracked, so after several payments this
/// drifts from a true amortization schedule.
pub fn installment_after_payment(new_balance: Decimal, term_months: u32) -> Decimal {
    let periods = term_months.saturating_sub(1).max(1);
    let installment = new_balance
        .checked_div(Decimal::from(periods))
        .map(|d| d.round_minor())
        .unwrap_or(new_balance);
    installment.min(new_balance)
}

/// The part of a requested payment that is actually applied: rounded to the
/// minor unit and capped at the outstanding balance.
pub fn clamp_payment(requested: Decimal, remaining: Decimal) -> Decimal {
    requested.round_minor().min(remaining)
}
