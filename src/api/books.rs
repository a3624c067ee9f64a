//! Catalog lookup endpoint

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{error::AppResult, models::CatalogItem, AppState};

use super::AuthenticatedCaller;

/// Get a book with its copy counters
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = CatalogItem),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedCaller(_caller): AuthenticatedCaller,
    Path(id): Path<i32>,
) -> AppResult<Json<CatalogItem>> {
    let book = state.services.get_book(id).await?;
    Ok(Json(book))
}
