//! Circulation engine for a lending library
//!
//! Lends single physical copies of catalog items, keeps per-item waiting
//! lists, and decides on every return whether the copy goes to the next
//! waiting patron or back on the shelf. Served as a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
