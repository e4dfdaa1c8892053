//! Loan ledger: borrowing events, due dates and late fees

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanClosing, LoanStats, LoanStatus, NewLoan},
        policy::{compute_due_date, LendingPolicy},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    policy: LendingPolicy,
}

impl LoansService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, policy: LendingPolicy) -> Self {
        Self {
            repository,
            clock,
            policy,
        }
    }

    /// Create a new loan (borrow an item)
    pub async fn create_loan(&self, patron_id: i32, item_id: i32) -> AppResult<Loan> {
        let loan_date = self.clock.now();
        let loan = self
            .repository
            .loans
            .create_if_available(NewLoan {
                patron_id,
                item_id,
                loan_date,
                due_date: compute_due_date(loan_date, &self.policy),
            })
            .await?;

        tracing::info!(
            "Loan {} created: patron {} borrowed item {} until {}",
            loan.id,
            patron_id,
            item_id,
            loan.due_date
        );
        Ok(loan)
    }

    /// Get a loan with its late fee observed now
    pub async fn get_loan(&self, loan_id: i32) -> AppResult<Loan> {
        let loan = self.find(loan_id).await?;
        Ok(loan.observed(self.clock.now(), &self.policy))
    }

    /// Close an active loan. Returned late, it becomes `overdue` and carries
    /// its late fee.
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<Loan> {
        let closing = self.closing(loan_id).await?;
        let loan = self.repository.loans.mark_returned(closing).await?;
        Self::log_return(&loan);
        Ok(loan)
    }

    /// How the loan would close if returned now. Writes nothing.
    pub async fn closing(&self, loan_id: i32) -> AppResult<LoanClosing> {
        let loan = self.find(loan_id).await?;
        LoanClosing::of(&loan, self.clock.now(), &self.policy)
    }

    pub(crate) fn log_return(loan: &Loan) {
        tracing::info!(
            "Loan {} returned by patron {} ({}, fee {})",
            loan.id,
            loan.patron_id,
            loan.status,
            loan.late_fee
        );
    }

    /// Loans of a patron, most recent first
    pub async fn history(&self, patron_id: i32) -> AppResult<Vec<Loan>> {
        let now = self.clock.now();
        Ok(self
            .repository
            .loans
            .list_for_patron(patron_id)
            .await?
            .into_iter()
            .map(|loan| loan.observed(now, &self.policy))
            .collect())
    }

    /// The patron's most recent loan still out
    pub async fn most_recent_active(&self, patron_id: i32) -> AppResult<Option<Loan>> {
        Ok(self
            .history(patron_id)
            .await?
            .into_iter()
            .find(|loan| loan.status == LoanStatus::Active))
    }

    pub async fn stats(&self, patron_id: i32) -> AppResult<LoanStats> {
        let loans = self.repository.loans.list_for_patron(patron_id).await?;
        Ok(LoanStats::collect(&loans, self.clock.now(), &self.policy))
    }

    async fn find(&self, loan_id: i32) -> AppResult<Loan> {
        self.repository
            .loans
            .get(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))
    }
}
