//! Lending transaction engine
//!
//! Tracks books lent to borrowers through a request / issue / return
//! lifecycle, keeping each book's available-copy counter consistent under
//! concurrent access, and exposes the operations over a REST JSON API.

use std::sync::Arc;

pub mod api;
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
