//! Reservation (waiting list) endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::reservation::{Reservation, ReservationStats},
    AppState,
};

/// Create reservation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReservationRequest {
    /// Patron ID
    #[validate(range(min = 1))]
    pub patron_id: i32,
    /// Item ID
    #[validate(range(min = 1))]
    pub item_id: i32,
}

#[derive(Serialize, ToSchema)]
pub struct PositionResponse {
    pub reservation_id: i32,
    /// 1-based rank in the waiting list, absent once the reservation is closed
    pub position: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct ExpireResponse {
    pub expired: u64,
}

/// Reserve an item that is currently out
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation admitted", body = Reservation),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Patron already waiting for this item"),
        (status = 422, description = "Item is available, borrow it instead")
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let item = state.services.catalog.get_item(request.item_id).await?;
    if item.available {
        return Err(AppError::BusinessRule(format!(
            "Item {} is available and cannot be reserved",
            item.id
        )));
    }

    let reservation = state
        .services
        .reservations
        .reserve(request.patron_id, request.item_id)
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Get a reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    Ok(Json(state.services.reservations.get(reservation_id).await?))
}

/// Cancel a pending reservation
#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    tag = "reservations",
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation is no longer pending")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    Ok(Json(state.services.reservations.cancel(reservation_id).await?))
}

/// Position of a reservation in its waiting list
#[utoipa::path(
    get,
    path = "/reservations/{id}/position",
    tag = "reservations",
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Position in line", body = PositionResponse),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation_position(
    State(state): State<AppState>,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<PositionResponse>> {
    let position = state.services.reservations.position(reservation_id).await?;
    Ok(Json(PositionResponse {
        reservation_id,
        position,
    }))
}

/// Next patron in line for an item
#[utoipa::path(
    get,
    path = "/items/{id}/reservations/next",
    tag = "reservations",
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Head of the waiting list", body = Reservation),
        (status = 404, description = "Nobody is waiting")
    )
)]
pub async fn get_next_reservation(
    State(state): State<AppState>,
    Path(item_id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    state
        .services
        .reservations
        .next_pending(item_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No pending reservation for item {}", item_id)))
}

/// Reservations of a patron, most recent first
#[utoipa::path(
    get,
    path = "/patrons/{id}/reservations",
    tag = "reservations",
    params(
        ("id" = i32, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Patron's reservations", body = Vec<Reservation>)
    )
)]
pub async fn get_patron_reservations(
    State(state): State<AppState>,
    Path(patron_id): Path<i32>,
) -> AppResult<Json<Vec<Reservation>>> {
    Ok(Json(
        state
            .services
            .reservations
            .list_for_patron(patron_id)
            .await?,
    ))
}

/// Reservation counters of a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/reservations/stats",
    tag = "reservations",
    params(
        ("id" = i32, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Reservation statistics", body = ReservationStats)
    )
)]
pub async fn get_patron_reservation_stats(
    State(state): State<AppState>,
    Path(patron_id): Path<i32>,
) -> AppResult<Json<ReservationStats>> {
    Ok(Json(state.services.reservations.stats(patron_id).await?))
}

/// Expire overdue reservations now
#[utoipa::path(
    post,
    path = "/maintenance/expire-reservations",
    tag = "reservations",
    responses(
        (status = 200, description = "Number of reservations expired", body = ExpireResponse)
    )
)]
pub async fn expire_reservations(State(state): State<AppState>) -> AppResult<Json<ExpireResponse>> {
    let expired = state.services.reservations.expire_overdue().await?;
    Ok(Json(ExpireResponse { expired }))
}
