//! Read-only catalog lookups

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{error::AppResult, models::item::CatalogItem, AppState};

/// Get item by ID
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item", body = CatalogItem),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<CatalogItem>> {
    Ok(Json(state.services.catalog.get_item(id).await?))
}

/// Get item by ISBN
#[utoipa::path(
    get,
    path = "/isbn/{isbn}",
    tag = "items",
    params(
        ("isbn" = String, Path, description = "ISBN, hyphens allowed")
    ),
    responses(
        (status = 200, description = "Item", body = CatalogItem),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_item_by_isbn(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> AppResult<Json<CatalogItem>> {
    Ok(Json(state.services.catalog.get_item_by_isbn(&isbn).await?))
}
