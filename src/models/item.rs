//! Catalog item as seen by the circulation engine.
//!
//! Only the identity and the availability flag matter here; bibliographic
//! data is owned by the catalog.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A lendable catalog entry (one physical copy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CatalogItem {
    pub id: i32,
    /// Natural key (ISBN, normalized)
    pub isbn: String,
    pub title: String,
    pub available: bool,
}

/// Item to seed into a store
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// Normalize ISBN by removing hyphens and spaces
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}
