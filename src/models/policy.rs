//! Lending policy: loan window, reservation lifetime and late fees.
//!
//! Every derived date or fee is computed by the pure functions in this module
//! at the point where a record is created or transitioned.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Number of days an item stays out on a single loan
pub const DEFAULT_LOAN_DAYS: i64 = 15;

/// Number of days a reservation waits before it expires
pub const DEFAULT_RESERVATION_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 86_400;

/// Late fee charged per started day past the due date (0.50)
pub fn default_fee_per_day() -> Decimal {
    Decimal::new(50, 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingPolicy {
    pub loan_days: i64,
    pub reservation_days: i64,
    pub fee_per_day: Decimal,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_days: DEFAULT_LOAN_DAYS,
            reservation_days: DEFAULT_RESERVATION_DAYS,
            fee_per_day: default_fee_per_day(),
        }
    }
}

impl LendingPolicy {
    /// Reject policies that would break the due date or expiry invariants
    pub fn validate(&self) -> AppResult<()> {
        if self.loan_days <= 0 {
            return Err(AppError::Validation(format!(
                "loan_days must be positive (got {})",
                self.loan_days
            )));
        }
        if self.reservation_days <= 0 {
            return Err(AppError::Validation(format!(
                "reservation_days must be positive (got {})",
                self.reservation_days
            )));
        }
        if self.fee_per_day.is_sign_negative() {
            return Err(AppError::Validation(format!(
                "fee_per_day must not be negative (got {})",
                self.fee_per_day
            )));
        }
        Ok(())
    }
}

/// Due date of a loan started at `loan_date`
pub fn compute_due_date(loan_date: DateTime<Utc>, policy: &LendingPolicy) -> DateTime<Utc> {
    loan_date + Duration::days(policy.loan_days)
}

/// Expiry of a reservation requested at `requested_at`
pub fn compute_expiry(requested_at: DateTime<Utc>, policy: &LendingPolicy) -> DateTime<Utc> {
    requested_at + Duration::days(policy.reservation_days)
}

/// Started days elapsed after `due_date`, zero when `as_of` is not past it
pub fn days_late(due_date: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    let seconds = (as_of - due_date).num_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

/// Late fee owed for a loan due at `due_date`, observed at `as_of`.
///
/// The result only depends on its inputs, so observing the same loan twice
/// never charges twice.
pub fn compute_late_fee(
    due_date: DateTime<Utc>,
    as_of: DateTime<Utc>,
    policy: &LendingPolicy,
) -> Decimal {
    Decimal::from(days_late(due_date, as_of)) * policy.fee_per_day
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_due_date_is_fifteen_days_later() {
        let policy = LendingPolicy::default();
        let due = compute_due_date(at(1, 10), &policy);
        assert_eq!(due, at(16, 10));
        assert!(due > at(1, 10));
    }

    #[test]
    fn test_expiry_is_thirty_days_later() {
        let policy = LendingPolicy::default();
        assert_eq!(
            compute_expiry(at(1, 0), &policy),
            Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_days_late_rounds_up_started_days() {
        let due = at(10, 12);
        assert_eq!(days_late(due, at(9, 12)), 0);
        assert_eq!(days_late(due, due), 0);
        assert_eq!(days_late(due, due + Duration::seconds(1)), 1);
        assert_eq!(days_late(due, at(11, 12)), 1);
        assert_eq!(days_late(due, at(12, 13)), 3);
    }

    #[test]
    fn test_late_fee() {
        let policy = LendingPolicy::default();
        let due = at(10, 0);
        assert_eq!(compute_late_fee(due, at(5, 0), &policy), Decimal::ZERO);
        assert_eq!(compute_late_fee(due, at(14, 0), &policy), Decimal::new(200, 2));
        // Observing twice yields the same amount
        assert_eq!(
            compute_late_fee(due, at(14, 0), &policy),
            compute_late_fee(due, at(14, 0), &policy)
        );
    }

    #[test]
    fn test_validate_policy() {
        assert!(LendingPolicy::default().validate().is_ok());

        let policy = LendingPolicy { loan_days: 0, ..Default::default() };
        assert!(policy.validate().is_err());

        let policy = LendingPolicy { fee_per_day: Decimal::new(-1, 0), ..Default::default() };
        assert!(policy.validate().is_err());
    }
}
