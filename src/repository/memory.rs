//! In-memory storage backend.
//!
//! All tables sit behind one async mutex; every trait method takes the lock
//! once and holds it for its whole read-modify-write.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{ItemDirectory, LoanStore, ReservationStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        item::{normalize_isbn, CatalogItem, NewItem},
        loan::{Loan, LoanClosing, LoanStatus, NewLoan},
        reservation::{NewReservation, Reservation, ReservationStatus},
    },
};

#[derive(Default)]
struct Tables {
    items: BTreeMap<i32, CatalogItem>,
    isbn_index: BTreeMap<String, i32>,
    /// Append-only; a loan with id `n` lives at index `n - 1`
    loans: Vec<Loan>,
    /// Append-only; same id layout as `loans`
    reservations: Vec<Reservation>,
    /// Last priority handed out per item
    priorities: HashMap<i32, i64>,
}

fn slot(id: i32) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

fn next_id(len: usize) -> AppResult<i32> {
    i32::try_from(len + 1).map_err(|_| AppError::Internal("Identifier space exhausted".to_string()))
}

impl Tables {
    fn loan_mut(&mut self, id: i32) -> Option<&mut Loan> {
        slot(id).and_then(|i| self.loans.get_mut(i))
    }

    fn reservation_mut(&mut self, id: i32) -> Option<&mut Reservation> {
        slot(id).and_then(|i| self.reservations.get_mut(i))
    }

    fn item_mut(&mut self, id: i32) -> AppResult<&mut CatalogItem> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", id)))
    }

    fn expire_stale(&mut self, item_id: Option<i32>, now: DateTime<Utc>) -> u64 {
        let mut expired = 0;
        for r in self
            .reservations
            .iter_mut()
            .filter(|r| item_id.map_or(true, |id| r.item_id == id) && r.is_stale_at(now))
        {
            r.status = ReservationStatus::Expired;
            expired += 1;
        }
        expired
    }

    fn close_loan(&mut self, closing: &LoanClosing) -> AppResult<Loan> {
        let id = closing.loan_id;
        let loan = self
            .loan_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        if loan.status != LoanStatus::Active {
            return Err(AppError::LoanNotActive(id, loan.status));
        }
        loan.returned_at = Some(closing.returned_at);
        loan.status = closing.status;
        loan.late_fee = closing.late_fee;
        loan.is_overdue = closing.status == LoanStatus::Overdue;
        Ok(loan.clone())
    }

    fn reallocate(&mut self, item_id: i32, now: DateTime<Utc>) -> AppResult<Option<Reservation>> {
        self.item_mut(item_id)?;
        self.expire_stale(Some(item_id), now);

        match self.pending_for_item(item_id, now).into_iter().next() {
            Some(next) => {
                let reservation = self.reservation_mut(next.id).ok_or_else(|| {
                    AppError::Internal(format!("Reservation {} vanished", next.id))
                })?;
                reservation.apply(ReservationStatus::Fulfilled, now)?;
                Ok(Some(reservation.clone()))
            }
            None => {
                self.item_mut(item_id)?.available = true;
                Ok(None)
            }
        }
    }

    fn pending_for_item(&self, item_id: i32, now: DateTime<Utc>) -> Vec<Reservation> {
        let mut pending: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| {
                r.item_id == item_id
                    && r.status == ReservationStatus::Pending
                    && !r.is_stale_at(now)
            })
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.priority);
        pending
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item to the directory. The ISBN is normalized and must be unique.
    pub async fn register_item(&self, item: NewItem) -> AppResult<CatalogItem> {
        let isbn = normalize_isbn(&item.isbn);
        if isbn.is_empty() {
            return Err(AppError::Validation("ISBN must not be empty".to_string()));
        }

        let mut tables = self.tables.lock().await;
        if tables.isbn_index.contains_key(&isbn) {
            return Err(AppError::Conflict(format!(
                "An item with ISBN {} already exists",
                isbn
            )));
        }

        let id = next_id(tables.items.len())?;
        let record = CatalogItem {
            id,
            isbn: isbn.clone(),
            title: item.title,
            available: item.available,
        };
        tables.isbn_index.insert(isbn, id);
        tables.items.insert(id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl ItemDirectory for MemoryStore {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<CatalogItem>> {
        Ok(self.tables.lock().await.items.get(&id).cloned())
    }

    async fn find_by_natural_key(&self, isbn: &str) -> AppResult<Option<CatalogItem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .isbn_index
            .get(isbn)
            .and_then(|id| tables.items.get(id))
            .cloned())
    }

    async fn set_available(&self, id: i32, available: bool) -> AppResult<()> {
        self.tables.lock().await.item_mut(id)?.available = available;
        Ok(())
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn create_if_available(&self, new: NewLoan) -> AppResult<Loan> {
        let mut tables = self.tables.lock().await;

        let item = tables.item_mut(new.item_id)?;
        if !item.available {
            return Err(AppError::ItemUnavailable(new.item_id));
        }
        item.available = false;

        let loan = Loan {
            id: next_id(tables.loans.len())?,
            patron_id: new.patron_id,
            item_id: new.item_id,
            loan_date: new.loan_date,
            due_date: new.due_date,
            returned_at: None,
            status: LoanStatus::Active,
            late_fee: Decimal::ZERO,
            is_overdue: false,
            notes: None,
        };
        tables.loans.push(loan.clone());
        Ok(loan)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Loan>> {
        let tables = self.tables.lock().await;
        Ok(slot(id).and_then(|i| tables.loans.get(i)).cloned())
    }

    async fn mark_returned(&self, closing: LoanClosing) -> AppResult<Loan> {
        self.tables.lock().await.close_loan(&closing)
    }

    async fn return_and_reallocate(
        &self,
        closing: LoanClosing,
    ) -> AppResult<(Loan, Option<Reservation>)> {
        let mut tables = self.tables.lock().await;
        // Every check that can fail runs before the first write
        tables.item_mut(closing.item_id)?;
        let loan = tables.close_loan(&closing)?;
        let fulfilled = tables.reallocate(closing.item_id, closing.returned_at)?;
        Ok((loan, fulfilled))
    }

    async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Loan>> {
        let tables = self.tables.lock().await;
        let mut loans: Vec<Loan> = tables
            .loans
            .iter()
            .filter(|l| l.patron_id == patron_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.loan_date.cmp(&a.loan_date).then(b.id.cmp(&a.id)));
        Ok(loans)
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert(&self, new: NewReservation) -> AppResult<Reservation> {
        let mut tables = self.tables.lock().await;
        tables.item_mut(new.item_id)?;
        tables.expire_stale(Some(new.item_id), new.requested_at);

        let already_waiting = tables.reservations.iter().any(|r| {
            r.patron_id == new.patron_id
                && r.item_id == new.item_id
                && r.status == ReservationStatus::Pending
        });
        if already_waiting {
            return Err(AppError::Conflict(format!(
                "Patron {} already has a pending reservation for item {}",
                new.patron_id, new.item_id
            )));
        }

        let priority = {
            let last = tables.priorities.entry(new.item_id).or_insert(0);
            *last += 1;
            *last
        };

        let reservation = Reservation {
            id: next_id(tables.reservations.len())?,
            patron_id: new.patron_id,
            item_id: new.item_id,
            requested_at: new.requested_at,
            status: ReservationStatus::Pending,
            priority,
            notified_at: None,
            fulfilled_at: None,
            expires_at: new.expires_at,
            notes: None,
        };
        tables.reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Reservation>> {
        let tables = self.tables.lock().await;
        Ok(slot(id).and_then(|i| tables.reservations.get(i)).cloned())
    }

    async fn pending_for_item(
        &self,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Reservation>> {
        Ok(self.tables.lock().await.pending_for_item(item_id, now))
    }

    async fn transition(
        &self,
        id: i32,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let mut tables = self.tables.lock().await;
        let reservation = tables
            .reservation_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;
        reservation.apply(next, at)?;
        Ok(reservation.clone())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(self.tables.lock().await.expire_stale(None, now))
    }

    async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Reservation>> {
        let tables = self.tables.lock().await;
        let mut reservations: Vec<Reservation> = tables
            .reservations
            .iter()
            .filter(|r| r.patron_id == patron_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| {
            b.requested_at
                .cmp(&a.requested_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(reservations)
    }

    async fn fulfill_next_or_release(
        &self,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        self.tables.lock().await.reallocate(item_id, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    async fn store_with_item(available: bool) -> (MemoryStore, CatalogItem) {
        let store = MemoryStore::new();
        let item = store
            .register_item(NewItem {
                isbn: "978-0-13-110362-7".into(),
                title: "The C Programming Language".into(),
                available,
            })
            .await
            .unwrap();
        (store, item)
    }

    #[tokio::test]
    async fn test_natural_key_lookup() {
        let (store, item) = store_with_item(true).await;
        assert_eq!(item.isbn, "9780131103627");

        let found = store.find_by_natural_key("9780131103627").await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(item.id));
        assert!(store.find_by_natural_key("0000").await.unwrap().is_none());

        let dup = store
            .register_item(NewItem {
                isbn: "9780131103627".into(),
                title: String::new(),
                available: true,
            })
            .await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_history_ties_broken_by_id() {
        let store = MemoryStore::new();
        for n in 0..3 {
            store
                .register_item(NewItem {
                    isbn: format!("isbn-{}", n),
                    title: String::new(),
                    available: true,
                })
                .await
                .unwrap();
        }
        for item_id in 1..=3 {
            store
                .create_if_available(NewLoan {
                    patron_id: 1,
                    item_id,
                    loan_date: t0(),
                    due_date: t0() + Duration::days(15),
                })
                .await
                .unwrap();
        }
        let ids: Vec<i32> = LoanStore::list_for_patron(&store, 1)
            .await
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_unavailable_item_creates_no_loan() {
        let (store, item) = store_with_item(false).await;
        let err = store
            .create_if_available(NewLoan {
                patron_id: 1,
                item_id: item.id,
                loan_date: t0(),
                due_date: t0() + Duration::days(15),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ItemUnavailable(id) if id == item.id));
        assert!(LoanStore::list_for_patron(&store, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_return_and_reallocate_is_one_step() {
        let (store, item) = store_with_item(true).await;
        let loan = store
            .create_if_available(NewLoan {
                patron_id: 1,
                item_id: item.id,
                loan_date: t0(),
                due_date: t0() + Duration::days(15),
            })
            .await
            .unwrap();
        let waiting = store
            .insert(NewReservation {
                patron_id: 2,
                item_id: item.id,
                requested_at: t0(),
                expires_at: t0() + Duration::days(30),
            })
            .await
            .unwrap();

        let closing = LoanClosing {
            loan_id: loan.id,
            item_id: item.id,
            returned_at: t0() + Duration::days(2),
            status: LoanStatus::Returned,
            late_fee: Decimal::ZERO,
        };
        let (closed, fulfilled) = store.return_and_reallocate(closing).await.unwrap();
        assert_eq!(closed.status, LoanStatus::Returned);
        assert_eq!(fulfilled.map(|r| r.id), Some(waiting.id));
        assert!(!store.find_by_id(item.id).await.unwrap().unwrap().available);

        // Second close changes nothing, not even availability
        let err = store.return_and_reallocate(closing).await.unwrap_err();
        assert!(matches!(err, AppError::LoanNotActive(_, LoanStatus::Returned)));
        assert!(!store.find_by_id(item.id).await.unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn test_transition_expires_stale_row() {
        let (store, item) = store_with_item(false).await;
        let r = store
            .insert(NewReservation {
                patron_id: 5,
                item_id: item.id,
                requested_at: t0(),
                expires_at: t0() + Duration::days(30),
            })
            .await
            .unwrap();

        let err = store
            .transition(r.id, ReservationStatus::Fulfilled, t0() + Duration::days(45))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReservationNotPending(_, ReservationStatus::Expired)));

        let stored = ReservationStore::get(&store, r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Expired);
    }

    #[tokio::test]
    async fn test_release_skips_stale_reservations() {
        let (store, item) = store_with_item(false).await;
        store
            .insert(NewReservation {
                patron_id: 5,
                item_id: item.id,
                requested_at: t0(),
                expires_at: t0() + Duration::days(30),
            })
            .await
            .unwrap();

        let later = t0() + Duration::days(31);
        let fulfilled = store.fulfill_next_or_release(item.id, later).await.unwrap();
        assert!(fulfilled.is_none());
        assert!(store.find_by_id(item.id).await.unwrap().unwrap().available);

        let r = ReservationStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Expired);
    }
}
