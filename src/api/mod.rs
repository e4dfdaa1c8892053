//! API handlers for the circulation REST endpoints

pub mod health;
pub mod items;
pub mod loans;
pub mod openapi;
pub mod reservations;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog lookups
        .route("/items/:id", get(items::get_item))
        .route("/isbn/:isbn", get(items::get_item_by_isbn))
        .route("/items/:id/reservations/next", get(reservations::get_next_reservation))
        // Loans
        .route("/loans", post(loans::create_loan))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        // Reservations
        .route("/reservations", post(reservations::create_reservation))
        .route(
            "/reservations/:id",
            get(reservations::get_reservation).delete(reservations::cancel_reservation),
        )
        .route("/reservations/:id/position", get(reservations::get_reservation_position))
        // Patrons
        .route("/patrons/:id/loans", get(loans::get_patron_loans))
        .route("/patrons/:id/loans/active", get(loans::get_patron_active_loan))
        .route("/patrons/:id/loans/stats", get(loans::get_patron_loan_stats))
        .route("/patrons/:id/reservations", get(reservations::get_patron_reservations))
        .route(
            "/patrons/:id/reservations/stats",
            get(reservations::get_patron_reservation_stats),
        )
        // Maintenance
        .route(
            "/maintenance/expire-reservations",
            post(reservations::expire_reservations),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
