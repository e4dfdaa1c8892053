//! Business logic services

pub mod catalog;
pub mod loans;
pub mod reservations;
pub mod returns;

use std::sync::Arc;

use crate::{clock::Clock, models::policy::LendingPolicy, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub returns: returns::ReturnsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, policy: LendingPolicy) -> Self {
        let catalog = catalog::CatalogService::new(repository.clone());
        let loans = loans::LoansService::new(repository.clone(), clock.clone(), policy);
        let reservations =
            reservations::ReservationsService::new(repository.clone(), clock.clone(), policy);
        let returns = returns::ReturnsService::new(repository, loans.clone(), catalog.clone());

        Self {
            catalog,
            loans,
            reservations,
            returns,
        }
    }
}
