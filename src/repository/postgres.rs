//! Postgres storage backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::{ItemDirectory, LoanStore, ReservationStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        item::CatalogItem,
        loan::{Loan, LoanClosing, LoanRow, NewLoan},
        reservation::{NewReservation, Reservation, ReservationRow, ReservationStatus},
    },
};

const LOAN_COLUMNS: &str =
    "id, patron_id, item_id, loan_date, due_date, returned_at, status, late_fee, notes";

const RESERVATION_COLUMNS: &str = "id, patron_id, item_id, requested_at, status, priority, \
     notified_at, fulfilled_at, expires_at, notes";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Take the row lock on an item for the rest of the transaction and
    /// return its availability flag
    async fn lock_item(conn: &mut PgConnection, item_id: i32) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT available FROM items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", item_id)))
    }

    async fn expire_stale_for_item(
        conn: &mut PgConnection,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reservations SET status = 'expired'
            WHERE item_id = $1 AND status = 'pending' AND expires_at <= $2
            "#,
        )
        .bind(item_id)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Conditional close; `None` when the loan is missing or already closed
    async fn close_loan(conn: &mut PgConnection, closing: &LoanClosing) -> AppResult<Option<Loan>> {
        sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            UPDATE loans SET returned_at = $2, status = $3, late_fee = $4
            WHERE id = $1 AND status = 'active'
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(closing.loan_id)
        .bind(closing.returned_at)
        .bind(closing.status.as_str())
        .bind(closing.late_fee)
        .fetch_optional(conn)
        .await?
        .map(Loan::try_from)
        .transpose()
    }

    /// Error for a close that matched no active row
    async fn not_closable(&self, id: i32) -> AppError {
        match LoanStore::get(self, id).await {
            Ok(Some(loan)) => AppError::LoanNotActive(id, loan.status),
            Ok(None) => AppError::NotFound(format!("Loan with id {} not found", id)),
            Err(e) => e,
        }
    }

    /// Fulfill the head of the item's waiting list or mark the item available.
    /// The caller must hold the item lock.
    async fn reallocate(
        conn: &mut PgConnection,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let expired = Self::expire_stale_for_item(&mut *conn, item_id, now).await?;
        if expired > 0 {
            tracing::debug!("Expired {} stale reservation(s) for item {}", expired, item_id);
        }

        let fulfilled = sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            UPDATE reservations
            SET status = 'fulfilled', fulfilled_at = $2, notified_at = COALESCE(notified_at, $2)
            WHERE id = (
                SELECT id FROM reservations
                WHERE item_id = $1 AND status = 'pending'
                ORDER BY priority ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(item_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        if fulfilled.is_none() {
            sqlx::query("UPDATE items SET available = TRUE WHERE id = $1")
                .bind(item_id)
                .execute(&mut *conn)
                .await?;
        }

        fulfilled.map(Reservation::try_from).transpose()
    }
}

#[async_trait]
impl ItemDirectory for PgStore {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(
            "SELECT id, isbn, title, available FROM items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn find_by_natural_key(&self, isbn: &str) -> AppResult<Option<CatalogItem>> {
        // Served by the unique btree index on items.isbn
        let item = sqlx::query_as::<_, CatalogItem>(
            "SELECT id, isbn, title, available FROM items WHERE isbn = $1",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn set_available(&self, id: i32, available: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE items SET available = $1 WHERE id = $2")
            .bind(available)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Item with id {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl LoanStore for PgStore {
    async fn create_if_available(&self, new: NewLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        if !Self::lock_item(&mut tx, new.item_id).await? {
            return Err(AppError::ItemUnavailable(new.item_id));
        }

        sqlx::query("UPDATE items SET available = FALSE WHERE id = $1")
            .bind(new.item_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            INSERT INTO loans (patron_id, item_id, loan_date, due_date, status, late_fee)
            VALUES ($1, $2, $3, $4, 'active', 0)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(new.patron_id)
        .bind(new.item_id)
        .bind(new.loan_date)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get(&self, id: i32) -> AppResult<Option<Loan>> {
        sqlx::query_as::<_, LoanRow>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Loan::try_from)
            .transpose()
    }

    async fn mark_returned(&self, closing: LoanClosing) -> AppResult<Loan> {
        let mut conn = self.pool.acquire().await?;
        match Self::close_loan(&mut conn, &closing).await? {
            Some(loan) => Ok(loan),
            None => Err(self.not_closable(closing.loan_id).await),
        }
    }

    async fn return_and_reallocate(
        &self,
        closing: LoanClosing,
    ) -> AppResult<(Loan, Option<Reservation>)> {
        let mut tx = self.pool.begin().await?;

        Self::lock_item(&mut tx, closing.item_id).await?;
        let Some(loan) = Self::close_loan(&mut tx, &closing).await? else {
            drop(tx);
            return Err(self.not_closable(closing.loan_id).await);
        };
        let fulfilled = Self::reallocate(&mut tx, closing.item_id, closing.returned_at).await?;

        tx.commit().await?;
        Ok((loan, fulfilled))
    }

    async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            SELECT {} FROM loans
            WHERE patron_id = $1
            ORDER BY loan_date DESC, id DESC
            "#,
            LOAN_COLUMNS
        ))
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Loan::try_from)
        .collect()
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn insert(&self, new: NewReservation) -> AppResult<Reservation> {
        let mut tx = self.pool.begin().await?;

        Self::lock_item(&mut tx, new.item_id).await?;
        Self::expire_stale_for_item(&mut tx, new.item_id, new.requested_at).await?;

        let already_waiting: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE patron_id = $1 AND item_id = $2 AND status = 'pending'
            )
            "#,
        )
        .bind(new.patron_id)
        .bind(new.item_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_waiting {
            return Err(AppError::Conflict(format!(
                "Patron {} already has a pending reservation for item {}",
                new.patron_id, new.item_id
            )));
        }

        let priority: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reservation_sequences (item_id, last_priority)
            VALUES ($1, 1)
            ON CONFLICT (item_id)
            DO UPDATE SET last_priority = reservation_sequences.last_priority + 1
            RETURNING last_priority
            "#,
        )
        .bind(new.item_id)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            INSERT INTO reservations (patron_id, item_id, requested_at, status, priority, expires_at)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(new.patron_id)
        .bind(new.item_id)
        .bind(new.requested_at)
        .bind(priority)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get(&self, id: i32) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Reservation::try_from)
        .transpose()
    }

    async fn pending_for_item(
        &self,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE item_id = $1 AND status = 'pending' AND expires_at > $2
            ORDER BY priority ASC
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(item_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Reservation::try_from)
        .collect()
    }

    async fn transition(
        &self,
        id: i32,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let mut tx = self.pool.begin().await?;

        let item_id: i32 = sqlx::query_scalar("SELECT item_id FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;

        // Reservation writes for one item are serialized on the item row
        Self::lock_item(&mut tx, item_id).await?;

        let mut reservation: Reservation = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let before = reservation.status;
        let applied = reservation.apply(next, at);
        if reservation.status == before {
            return applied.map(|_| reservation);
        }

        sqlx::query(
            r#"
            UPDATE reservations SET status = $2, fulfilled_at = $3, notified_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reservation.status.as_str())
        .bind(reservation.fulfilled_at)
        .bind(reservation.notified_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        applied.map(|_| reservation)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let item_ids: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT item_id FROM reservations
            WHERE status = 'pending' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut expired = 0;
        for item_id in item_ids {
            let mut tx = self.pool.begin().await?;
            Self::lock_item(&mut tx, item_id).await?;
            expired += Self::expire_stale_for_item(&mut tx, item_id, now).await?;
            tx.commit().await?;
        }
        Ok(expired)
    }

    async fn list_for_patron(&self, patron_id: i32) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE patron_id = $1
            ORDER BY requested_at DESC, id DESC
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Reservation::try_from)
        .collect()
    }

    async fn fulfill_next_or_release(
        &self,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let mut tx = self.pool.begin().await?;

        Self::lock_item(&mut tx, item_id).await?;
        let fulfilled = Self::reallocate(&mut tx, item_id, now).await?;

        tx.commit().await?;
        Ok(fulfilled)
    }
}
