//! Return coordination.
//!
//! Every returned copy ends up in exactly one place: handed to the head of
//! its waiting list, or back on the shelf. Never both.

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanClosing},
        return_outcome::{ConsistencyWarning, ReturnOutcome},
    },
    repository::Repository,
};

use super::{catalog::CatalogService, loans::LoansService};

#[derive(Clone)]
pub struct ReturnsService {
    repository: Repository,
    loans: LoansService,
    catalog: CatalogService,
}

impl ReturnsService {
    pub fn new(repository: Repository, loans: LoansService, catalog: CatalogService) -> Self {
        Self {
            repository,
            loans,
            catalog,
        }
    }

    /// Return a loan and re-allocate the freed copy.
    ///
    /// Closing the loan and re-allocating the copy commit together, so a
    /// failed return leaves the loan active and can be retried as is.
    pub async fn handle_return(&self, loan_id: i32) -> AppResult<ReturnOutcome> {
        let closing = self.loans.closing(loan_id).await?;
        let item_id = closing.item_id;

        // Catalog trouble only degrades the outcome; the loan still closes
        let resolved = match self.catalog.resolve(item_id).await {
            Ok(resolved) => resolved.is_some(),
            Err(e) => {
                tracing::error!("Catalog lookup for item {} failed: {}", item_id, e);
                false
            }
        };
        if !resolved {
            return self.close_orphaned(closing).await;
        }

        let (loan, fulfilled) = match self.repository.loans.return_and_reallocate(closing).await {
            Ok(done) => done,
            Err(AppError::NotFound(_)) => return self.close_orphaned(closing).await,
            Err(e) => return Err(e),
        };
        LoansService::log_return(&loan);

        match fulfilled {
            Some(reservation) => {
                tracing::info!(
                    "Item {} returned by loan {} goes to reservation {} (patron {})",
                    item_id,
                    loan.id,
                    reservation.id,
                    reservation.patron_id
                );
                Ok(ReturnOutcome::assigned(loan, reservation))
            }
            None => {
                tracing::info!(
                    "Item {} returned by loan {} is back on the shelf",
                    item_id,
                    loan.id
                );
                Ok(ReturnOutcome::released(loan))
            }
        }
    }

    async fn close_orphaned(&self, closing: LoanClosing) -> AppResult<ReturnOutcome> {
        let loan = self.repository.loans.mark_returned(closing).await?;
        LoansService::log_return(&loan);
        Ok(Self::orphaned(loan, closing.item_id))
    }

    fn orphaned(loan: Loan, item_id: i32) -> ReturnOutcome {
        let warning = ConsistencyWarning {
            item_id,
            message: format!(
                "Item {} could not be resolved through the catalog; availability left unchanged",
                item_id
            ),
        };
        tracing::warn!(
            "Loan {} returned but item {} is orphaned: {}",
            loan.id,
            item_id,
            warning.message
        );
        ReturnOutcome::orphaned(loan, warning)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::{
        clock::ManualClock,
        models::{
            item::{CatalogItem, NewItem},
            loan::{LoanStatus, NewLoan},
            policy::LendingPolicy,
            reservation::{Reservation, ReservationStatus},
        },
        repository::{ItemDirectory, LoanStore, MemoryStore, MockItemDirectory, ReservationStore},
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    /// Loan store whose next combined return fails like a dropped connection
    struct FailingOnce {
        inner: MemoryStore,
        armed: AtomicBool,
    }

    #[async_trait]
    impl LoanStore for FailingOnce {
        async fn create_if_available(&self, loan: NewLoan) -> AppResult<Loan> {
            self.inner.create_if_available(loan).await
        }

        async fn get(&self, id: i32) -> AppResult<Option<Loan>> {
            LoanStore::get(&self.inner, id).await
        }

        async fn mark_returned(&self, closing: LoanClosing) -> AppResult<Loan> {
            self.inner.mark_returned(closing).await
        }

        async fn return_and_reallocate(
            &self,
            closing: LoanClosing,
        ) -> AppResult<(Loan, Option<Reservation>)> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.return_and_reallocate(closing).await
        }

        async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Loan>> {
            LoanStore::list_for_patron(&self.inner, patron_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_return_leaves_loan_open_for_retry() {
        let store = MemoryStore::new();
        let item = store
            .register_item(NewItem {
                isbn: "9780262510875".into(),
                title: "Structure and Interpretation of Computer Programs".into(),
                available: true,
            })
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        let repository = Repository {
            items: Arc::new(store.clone()),
            loans: Arc::new(FailingOnce {
                inner: store.clone(),
                armed: AtomicBool::new(true),
            }),
            reservations: Arc::new(store.clone()),
        };
        let services = crate::services::Services::new(repository, clock, LendingPolicy::default());

        let loan = services.loans.create_loan(11, item.id).await.unwrap();
        let waiting = services.reservations.reserve(12, item.id).await.unwrap();

        let err = services.returns.handle_return(loan.id).await.unwrap_err();
        assert!(err.is_retryable());

        // Nothing of the failed attempt is visible
        let open = LoanStore::get(&store, loan.id).await.unwrap().unwrap();
        assert_eq!(open.status, LoanStatus::Active);
        assert!(!store.find_by_id(item.id).await.unwrap().unwrap().available);
        let still_waiting = ReservationStore::get(&store, waiting.id).await.unwrap().unwrap();
        assert_eq!(still_waiting.status, ReservationStatus::Pending);

        let outcome = services.returns.handle_return(loan.id).await.unwrap();
        assert_eq!(outcome.loan.status, LoanStatus::Returned);
        assert_eq!(outcome.reservation.map(|r| r.id), Some(waiting.id));
        assert!(!store.find_by_id(item.id).await.unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn test_orphaned_item_keeps_return_but_not_availability() {
        let store = MemoryStore::new();
        let item = store
            .register_item(NewItem {
                isbn: "9780596517748".into(),
                title: "JavaScript: The Good Parts".into(),
                available: true,
            })
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        let policy = LendingPolicy::default();

        // Borrow through the real store, then return with a directory whose
        // natural key index has lost the item
        let full = Repository::in_memory(store.clone());
        let loans = LoansService::new(full, clock.clone(), policy);
        let loan = loans.create_loan(11, item.id).await.unwrap();

        let mut directory = MockItemDirectory::new();
        let known = CatalogItem { available: false, ..item.clone() };
        directory
            .expect_find_by_id()
            .returning(move |_| Ok(Some(known.clone())));
        directory.expect_find_by_natural_key().returning(|_| Ok(None));
        directory.expect_set_available().never();

        let repository = Repository {
            items: Arc::new(directory),
            loans: Arc::new(store.clone()),
            reservations: Arc::new(store.clone()),
        };
        let loans = LoansService::new(repository.clone(), clock.clone(), policy);
        let catalog = CatalogService::new(repository.clone());
        let returns = ReturnsService::new(repository, loans, catalog);

        let outcome = returns.handle_return(loan.id).await.unwrap();
        assert_eq!(outcome.loan.status, LoanStatus::Returned);
        assert!(!outcome.assigned_to_reservation);
        assert_eq!(outcome.warning.map(|w| w.item_id), Some(item.id));

        let stored = store.find_by_id(item.id).await.unwrap().unwrap();
        assert!(!stored.available);
    }
}
