//! Reservation queue: waiting lists for unavailable items.
//!
//! Serving order is the stored priority, not any collection order.

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        policy::{compute_expiry, LendingPolicy},
        reservation::{NewReservation, Reservation, ReservationStats, ReservationStatus},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    policy: LendingPolicy,
}

impl ReservationsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, policy: LendingPolicy) -> Self {
        Self {
            repository,
            clock,
            policy,
        }
    }

    /// Join the waiting list of an item.
    ///
    /// Whether the item is actually unavailable is for the caller to check.
    pub async fn reserve(&self, patron_id: i32, item_id: i32) -> AppResult<Reservation> {
        let requested_at = self.clock.now();
        let reservation = self
            .repository
            .reservations
            .insert(NewReservation {
                patron_id,
                item_id,
                requested_at,
                expires_at: compute_expiry(requested_at, &self.policy),
            })
            .await?;

        tracing::info!(
            "Reservation {} admitted: patron {} waits for item {} (priority {})",
            reservation.id,
            patron_id,
            item_id,
            reservation.priority
        );
        Ok(reservation)
    }

    pub async fn get(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.expire_overdue().await?;
        self.find(reservation_id).await
    }

    /// Head of the waiting list: the pending reservation with the smallest priority
    pub async fn next_pending(&self, item_id: i32) -> AppResult<Option<Reservation>> {
        self.expire_overdue().await?;
        Ok(self
            .repository
            .reservations
            .pending_for_item(item_id, self.clock.now())
            .await?
            .into_iter()
            .next())
    }

    /// 1-based rank of a pending reservation in its item's waiting list
    pub async fn position(&self, reservation_id: i32) -> AppResult<Option<usize>> {
        let reservation = self.get(reservation_id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Ok(None);
        }
        let pending = self
            .repository
            .reservations
            .pending_for_item(reservation.item_id, self.clock.now())
            .await?;
        Ok(pending
            .iter()
            .position(|r| r.id == reservation_id)
            .map(|index| index + 1))
    }

    pub async fn cancel(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.expire_overdue().await?;
        let reservation = self
            .repository
            .reservations
            .transition(reservation_id, ReservationStatus::Cancelled, self.clock.now())
            .await?;
        tracing::info!(
            "Reservation {} cancelled by patron {}",
            reservation.id,
            reservation.patron_id
        );
        Ok(reservation)
    }

    pub async fn fulfill(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.expire_overdue().await?;
        let reservation = self
            .repository
            .reservations
            .transition(reservation_id, ReservationStatus::Fulfilled, self.clock.now())
            .await?;
        tracing::info!(
            "Reservation {} fulfilled for patron {}",
            reservation.id,
            reservation.patron_id
        );
        Ok(reservation)
    }

    /// Expire every pending reservation past its expiry date
    pub async fn expire_overdue(&self) -> AppResult<u64> {
        let expired = self
            .repository
            .reservations
            .expire_overdue(self.clock.now())
            .await?;
        if expired > 0 {
            tracing::debug!("Expired {} reservation(s)", expired);
        }
        Ok(expired)
    }

    /// Reservations of a patron, most recent request first
    pub async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Reservation>> {
        self.expire_overdue().await?;
        self.repository
            .reservations
            .list_for_patron(patron_id)
            .await
    }

    pub async fn stats(&self, patron_id: i32) -> AppResult<ReservationStats> {
        let reservations = self.list_for_patron(patron_id).await?;
        Ok(ReservationStats::collect(&reservations))
    }

    async fn find(&self, reservation_id: i32) -> AppResult<Reservation> {
        self.repository
            .reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Reservation with id {} not found", reservation_id))
            })
    }
}
