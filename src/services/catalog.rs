//! Catalog lookup service

use crate::{
    error::{AppError, AppResult},
    models::item::{normalize_isbn, CatalogItem},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get item by ID
    pub async fn get_item(&self, id: i32) -> AppResult<CatalogItem> {
        self.repository
            .items
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with id {} not found", id)))
    }

    /// Get item by ISBN (hyphens and spaces are ignored)
    pub async fn get_item_by_isbn(&self, isbn: &str) -> AppResult<CatalogItem> {
        self.find_by_isbn(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with ISBN {} not found", isbn)))
    }

    pub async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<CatalogItem>> {
        let isbn = normalize_isbn(isbn);
        if isbn.is_empty() {
            return Ok(None);
        }
        self.repository.items.find_by_natural_key(&isbn).await
    }

    /// Re-resolve an item through its natural key. Returns `None` when the
    /// item is gone or its ISBN no longer points back at it.
    pub async fn resolve(&self, item_id: i32) -> AppResult<Option<CatalogItem>> {
        let Some(item) = self.repository.items.find_by_id(item_id).await? else {
            return Ok(None);
        };
        Ok(self
            .find_by_isbn(&item.isbn)
            .await?
            .filter(|resolved| resolved.id == item_id))
    }

    pub async fn set_available(&self, id: i32, available: bool) -> AppResult<()> {
        self.repository.items.set_available(id, available).await
    }
}
