//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, items, loans, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "0.1.0",
        description = "Loans and reservations for a lending library",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Items
        items::get_item,
        items::get_item_by_isbn,
        // Loans
        loans::create_loan,
        loans::get_loan,
        loans::return_loan,
        loans::get_patron_loans,
        loans::get_patron_active_loan,
        loans::get_patron_loan_stats,
        // Reservations
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::get_reservation_position,
        reservations::get_next_reservation,
        reservations::get_patron_reservations,
        reservations::get_patron_reservation_stats,
        reservations::expire_reservations,
    ),
    components(
        schemas(
            // Items
            crate::models::item::CatalogItem,
            // Loans
            loans::CreateLoanRequest,
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanStats,
            crate::models::return_outcome::ReturnOutcome,
            crate::models::return_outcome::ConsistencyWarning,
            // Reservations
            reservations::CreateReservationRequest,
            reservations::PositionResponse,
            reservations::ExpireResponse,
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::ReservationStats,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "items", description = "Catalog lookups"),
        (name = "loans", description = "Loan management"),
        (name = "reservations", description = "Waiting lists")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
