//! Business logic services

pub mod access;
pub mod clock;
pub mod lending;

use std::sync::Arc;

use crate::{
    config::LendingConfig,
    error::AppResult,
    models::{CatalogItem, LendingPolicy},
    repository::Repository,
};

/// Container for all services, built once at process start
#[derive(Clone)]
pub struct Services {
    pub lending: lending::LendingService,
    repository: Repository,
}

impl Services {
    pub fn new(repository: Repository, lending_config: &LendingConfig, clock: Arc<dyn clock::Clock>) -> Self {
        Self {
            lending: lending::LendingService::new(
                repository.clone(),
                LendingPolicy::from(lending_config),
                clock,
            ),
            repository,
        }
    }

    /// Catalog lookup for the books endpoint
    pub async fn get_book(&self, item_id: i32) -> AppResult<CatalogItem> {
        self.repository.catalog.get_item(item_id).await
    }

    /// Storage readiness probe
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.transactions.ping().await
    }
}
