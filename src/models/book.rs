//! Catalog item (book) model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Book from the catalog, with its lendable copy counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CatalogItem {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub edition: Option<String>,
    pub genre: Option<String>,
    pub total_copies: i32,
    /// Always within `0..=total_copies`
    pub available_copies: i32,
}

impl CatalogItem {
    /// New item with every copy on the shelf
    pub fn new(id: i32, title: impl Into<String>, author: impl Into<String>, total_copies: i32) -> Self {
        Self {
            id,
            title: title.into(),
            author: author.into(),
            edition: None,
            genre: None,
            total_copies,
            available_copies: total_copies,
        }
    }
}
