//! Error types for the circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{loan::LoanStatus, reservation::ReservationStatus};

/// Stable error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    ItemNotAvailable = 7,
    Duplicate = 8,
    BadValue = 18,
    NoSuchData = 20,
    LoanNotActive = 22,
    ReservationNotPending = 23,
    BusinessRule = 24,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Item {0} is not available")]
    ItemUnavailable(i32),

    #[error("Loan {0} is not active (status: {1})")]
    LoanNotActive(i32, LoanStatus),

    #[error("Reservation {0} is not pending (status: {1})")]
    ReservationNotPending(i32, ReservationStatus),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),
}

impl AppError {
    /// Borrowing an unavailable item, returning a closed loan, or moving a
    /// closed reservation
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            AppError::ItemUnavailable(_)
                | AppError::LoanNotActive(..)
                | AppError::ReservationNotPending(..)
        )
    }

    /// Only storage failures may succeed on a plain retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Database(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::ItemUnavailable(_) => ErrorCode::ItemNotAvailable,
            AppError::LoanNotActive(..) => ErrorCode::LoanNotActive,
            AppError::ReservationNotPending(..) => ErrorCode::ReservationNotPending,
            AppError::Validation(_) | AppError::BadRequest(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Conflict(_) => ErrorCode::Duplicate,
            AppError::Internal(_) => ErrorCode::Failure,
            AppError::BusinessRule(_) => ErrorCode::BusinessRule,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ItemUnavailable(_)
            | AppError::LoanNotActive(..)
            | AppError::ReservationNotPending(..)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BusinessRule(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let code = self.code();
        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (self.status(), body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_errors_are_not_retryable() {
        let errors = [
            AppError::ItemUnavailable(1),
            AppError::LoanNotActive(2, LoanStatus::Returned),
            AppError::ReservationNotPending(3, ReservationStatus::Expired),
        ];
        for err in errors {
            assert!(err.is_invalid_transition());
            assert!(!err.is_retryable());
            assert_eq!(err.status(), StatusCode::CONFLICT);
        }
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response = AppError::Internal("pool exploded at 0xdead".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            AppError::LoanNotActive(12, LoanStatus::Overdue).to_string(),
            "Loan 12 is not active (status: overdue)"
        );
        assert_eq!(AppError::ItemUnavailable(4).code() as u32, 7);
    }

    #[test]
    fn test_error_codes_are_stable() {
        let codes = [
            (AppError::Internal(String::new()), 1),
            (AppError::Database(sqlx::Error::PoolTimedOut), 3),
            (AppError::Conflict(String::new()), 8),
            (AppError::Validation(String::new()), 18),
            (AppError::NotFound(String::new()), 20),
            (AppError::LoanNotActive(1, LoanStatus::Returned), 22),
            (AppError::ReservationNotPending(1, ReservationStatus::Cancelled), 23),
            (AppError::BusinessRule(String::new()), 24),
        ];
        for (err, code) in codes {
            assert_eq!(err.code() as u32, code, "{}", err);
        }
    }
}
