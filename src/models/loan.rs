//! Loan (borrow) model and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::policy::{compute_late_fee, LendingPolicy};
use crate::error::{AppError, AppResult};

/// Loan lifecycle status. `Returned` and `Overdue` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Active)
    }

    /// Terminal status reached by returning at `returned_at` a loan due at `due_date`
    pub fn on_return(due_date: DateTime<Utc>, returned_at: DateTime<Utc>) -> Self {
        if returned_at > due_date {
            LoanStatus::Overdue
        } else {
            LoanStatus::Returned
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            other => Err(AppError::Internal(format!("Unknown loan status '{}'", other))),
        }
    }
}

/// A borrowing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub patron_id: i32,
    pub item_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// Late fee as last observed
    #[schema(value_type = String)]
    pub late_fee: Decimal,
    /// True when the loan is past due, whether still out or returned late
    #[serde(default)]
    pub is_overdue: bool,
    pub notes: Option<String>,
}

impl Loan {
    /// Whether the loan counts as overdue when observed at `now`
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            LoanStatus::Active => now > self.due_date,
            LoanStatus::Overdue => true,
            LoanStatus::Returned => false,
        }
    }

    /// Late fee owed as observed at `now`. Terminal loans are measured at
    /// their return date, so the value no longer moves once returned.
    pub fn late_fee_at(&self, now: DateTime<Utc>, policy: &LendingPolicy) -> Decimal {
        let as_of = match self.status {
            LoanStatus::Active => now,
            _ => self.returned_at.unwrap_or(now),
        };
        compute_late_fee(self.due_date, as_of, policy)
    }

    /// Refresh the derived fields for display at `now`
    pub fn observed(mut self, now: DateTime<Utc>, policy: &LendingPolicy) -> Self {
        self.late_fee = self.late_fee_at(now, policy);
        self.is_overdue = self.is_overdue_at(now);
        self
    }
}

/// Loan about to be recorded
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub patron_id: i32,
    pub item_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Terminal state a loan moves to, computed before anything is written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanClosing {
    pub loan_id: i32,
    pub item_id: i32,
    pub returned_at: DateTime<Utc>,
    pub status: LoanStatus,
    pub late_fee: Decimal,
}

impl LoanClosing {
    /// Close `loan` at `returned_at`. Fails with `LoanNotActive` on a terminal loan.
    pub fn of(loan: &Loan, returned_at: DateTime<Utc>, policy: &LendingPolicy) -> AppResult<Self> {
        if loan.status.is_terminal() {
            return Err(AppError::LoanNotActive(loan.id, loan.status));
        }
        Ok(Self {
            loan_id: loan.id,
            item_id: loan.item_id,
            returned_at,
            status: LoanStatus::on_return(loan.due_date, returned_at),
            late_fee: loan.late_fee_at(returned_at, policy),
        })
    }
}

/// Loan row as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct LoanRow {
    pub id: i32,
    pub patron_id: i32,
    pub item_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: String,
    pub late_fee: Decimal,
    pub notes: Option<String>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        let status: LoanStatus = row.status.parse()?;
        Ok(Loan {
            id: row.id,
            patron_id: row.patron_id,
            item_id: row.item_id,
            loan_date: row.loan_date,
            due_date: row.due_date,
            returned_at: row.returned_at,
            is_overdue: status == LoanStatus::Overdue,
            status,
            late_fee: row.late_fee,
            notes: row.notes,
        })
    }
}

/// Per-patron loan counters.
///
/// Every loan falls in exactly one bucket: an active loan past its due date
/// counts as overdue, not active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoanStats {
    pub total: i64,
    pub active: i64,
    pub returned: i64,
    pub overdue: i64,
    /// Sum of late fees over the patron's history
    #[schema(value_type = String)]
    pub outstanding_fees: Decimal,
}

impl LoanStats {
    /// Single pass over a loan history
    pub fn collect<'a>(
        loans: impl IntoIterator<Item = &'a Loan>,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> Self {
        loans.into_iter().fold(LoanStats::default(), |mut stats, loan| {
            stats.total += 1;
            if loan.is_overdue_at(now) {
                stats.overdue += 1;
            } else if loan.status == LoanStatus::Active {
                stats.active += 1;
            } else {
                stats.returned += 1;
            }
            stats.outstanding_fees += loan.late_fee_at(now, policy);
            stats
        })
    }
}
