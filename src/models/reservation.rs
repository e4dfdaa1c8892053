//! Reservation (waiting list entry) model and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

/// Reservation lifecycle status. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        *self == ReservationStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "fulfilled" => Ok(ReservationStatus::Fulfilled),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(AppError::Internal(format!(
                "Unknown reservation status '{}'",
                other
            ))),
        }
    }
}

/// A standing request for a currently unavailable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub patron_id: i32,
    pub item_id: i32,
    pub requested_at: DateTime<Utc>,
    pub status: ReservationStatus,
    /// Serving order within the item; lower is served first, never reused
    pub priority: i64,
    pub notified_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Reservation {
    /// Pending but past its expiry date
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && now >= self.expires_at
    }

    /// Apply a transition in place, setting the timestamps it implies.
    ///
    /// A reservation found stale at `at` is expired instead, and the
    /// requested move is refused.
    pub fn apply(&mut self, next: ReservationStatus, at: DateTime<Utc>) -> Result<(), AppError> {
        if next != ReservationStatus::Expired && self.is_stale_at(at) {
            self.status = ReservationStatus::Expired;
            return Err(AppError::ReservationNotPending(self.id, self.status));
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::ReservationNotPending(self.id, self.status));
        }
        if next == ReservationStatus::Fulfilled {
            self.fulfilled_at = Some(at);
            self.notified_at.get_or_insert(at);
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub patron_id: i32,
    pub item_id: i32,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReservationRow {
    pub id: i32,
    pub patron_id: i32,
    pub item_id: i32,
    pub requested_at: DateTime<Utc>,
    pub status: String,
    pub priority: i64,
    pub notified_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            patron_id: row.patron_id,
            item_id: row.item_id,
            requested_at: row.requested_at,
            status: row.status.parse()?,
            priority: row.priority,
            notified_at: row.notified_at,
            fulfilled_at: row.fulfilled_at,
            expires_at: row.expires_at,
            notes: row.notes,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReservationStats {
    pub total: i64,
    pub pending: i64,
    pub fulfilled: i64,
    pub cancelled: i64,
    pub expired: i64,
}

impl ReservationStats {
    pub fn collect<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Self {
        reservations
            .into_iter()
            .fold(ReservationStats::default(), |mut stats, r| {
                stats.total += 1;
                match r.status {
                    ReservationStatus::Pending => stats.pending += 1,
                    ReservationStatus::Fulfilled => stats.fulfilled += 1,
                    ReservationStatus::Cancelled => stats.cancelled += 1,
                    ReservationStatus::Expired => stats.expired += 1,
                }
                stats
            })
    }
}
