//! Loan management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanStats},
        return_outcome::ReturnOutcome,
    },
    AppState,
};

/// Create loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequest {
    /// Patron ID
    #[validate(range(min = 1))]
    pub patron_id: i32,
    /// Item ID
    #[validate(range(min = 1))]
    pub item_id: i32,
}

/// Create a new loan (borrow an item)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Item not available")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let loan = state
        .services
        .loans
        .create_loan(request.patron_id, request.item_id)
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Get a loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan with late fee as of now", body = Loan),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    Ok(Json(state.services.loans.get_loan(loan_id).await?))
}

/// Return a borrowed item
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Item returned and re-allocated", body = ReturnOutcome),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<ReturnOutcome>> {
    Ok(Json(state.services.returns.handle_return(loan_id).await?))
}

/// Loan history of a patron, most recent first
#[utoipa::path(
    get,
    path = "/patrons/{id}/loans",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Patron's loans", body = Vec<Loan>)
    )
)]
pub async fn get_patron_loans(
    State(state): State<AppState>,
    Path(patron_id): Path<i32>,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.history(patron_id).await?))
}

/// Most recent loan still out for a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/loans/active",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Most recent active loan", body = Loan),
        (status = 404, description = "No active loan")
    )
)]
pub async fn get_patron_active_loan(
    State(state): State<AppState>,
    Path(patron_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    state
        .services
        .loans
        .most_recent_active(patron_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No active loan for patron {}", patron_id)))
}

/// Loan counters of a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/loans/stats",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Loan statistics", body = LoanStats)
    )
)]
pub async fn get_patron_loan_stats(
    State(state): State<AppState>,
    Path(patron_id): Path<i32>,
) -> AppResult<Json<LoanStats>> {
    Ok(Json(state.services.loans.stats(patron_id).await?))
}
