//! Storage layer for items, loans and reservations.
//!
//! Each trait method that reads then writes runs as one atomic unit against
//! its backend: a transaction holding the item row lock for Postgres, the
//! table mutex for the in-memory store.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        item::CatalogItem,
        loan::{Loan, LoanClosing, NewLoan},
        reservation::{NewReservation, Reservation, ReservationStatus},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Catalog item directory (identity and availability only)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemDirectory: Send + Sync {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<CatalogItem>>;

    /// Ordered lookup on the natural key index. `isbn` must be normalized.
    async fn find_by_natural_key(&self, isbn: &str) -> AppResult<Option<CatalogItem>>;

    async fn set_available(&self, id: i32, available: bool) -> AppResult<()>;
}

#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Check that the item is available, flip it to unavailable and record the
    /// loan. Fails with `ItemUnavailable` without writing anything otherwise.
    async fn create_if_available(&self, loan: NewLoan) -> AppResult<Loan>;

    async fn get(&self, id: i32) -> AppResult<Option<Loan>>;

    /// Close an active loan. Fails with `LoanNotActive` if it was already closed.
    async fn mark_returned(&self, closing: LoanClosing) -> AppResult<Loan>;

    /// Close an active loan and re-allocate its copy in the same atomic
    /// section: hand it to the head of the item's waiting list, or put it
    /// back on the shelf. Nothing is written when any step fails.
    async fn return_and_reallocate(
        &self,
        closing: LoanClosing,
    ) -> AppResult<(Loan, Option<Reservation>)>;

    /// All loans of a patron, most recent first (ties broken by id, descending)
    async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Loan>>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Admit a reservation with the next priority of its item.
    /// Fails with `Conflict` if the patron already waits for that item.
    async fn insert(&self, reservation: NewReservation) -> AppResult<Reservation>;

    async fn get(&self, id: i32) -> AppResult<Option<Reservation>>;

    /// Pending reservations of an item that have not expired at `now`,
    /// smallest priority first
    async fn pending_for_item(&self, item_id: i32, now: DateTime<Utc>)
        -> AppResult<Vec<Reservation>>;

    /// Move a pending reservation to a terminal status
    async fn transition(
        &self,
        id: i32,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Reservation>;

    /// Expire every pending reservation whose expiry is not after `now`
    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// All reservations of a patron, most recent request first
    async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Reservation>>;

    /// Hand a freed copy to the head of its waiting list, or put it back on
    /// the shelf when nobody waits. Returns the fulfilled reservation, if any.
    async fn fulfill_next_or_release(
        &self,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>>;
}

/// Main repository struct holding the storage backends
#[derive(Clone)]
pub struct Repository {
    pub items: Arc<dyn ItemDirectory>,
    pub loans: Arc<dyn LoanStore>,
    pub reservations: Arc<dyn ReservationStore>,
}

impl Repository {
    /// Repository backed by Postgres
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        let store = PgStore::new(pool);
        Self {
            items: Arc::new(store.clone()),
            loans: Arc::new(store.clone()),
            reservations: Arc::new(store),
        }
    }

    /// Repository backed by process memory
    pub fn in_memory(store: MemoryStore) -> Self {
        Self {
            items: Arc::new(store.clone()),
            loans: Arc::new(store.clone()),
            reservations: Arc::new(store),
        }
    }
}
