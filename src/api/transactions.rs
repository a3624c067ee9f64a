//! Lending transaction endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{TransactionDetails, TransactionStatus},
    AppState,
};

use super::AuthenticatedCaller;

/// Borrow request
#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateTransactionRequest {
    /// Book ID
    #[validate(range(min = 1, message = "item_id must be positive"))]
    pub item_id: i32,
    /// Borrower ID (defaults to the caller)
    pub borrower_id: Option<i32>,
}

/// Listing filter
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    /// REQUESTED, ISSUED, RETURNED or OVERDUE
    pub status: Option<String>,
}

/// Request a book
#[utoipa::path(
    post,
    path = "/transactions",
    tag = "transactions",
    security(("bearer_auth" = [])),
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Request created", body = TransactionDetails),
        (status = 403, description = "Caller may not request for this borrower"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Open request already exists")
    )
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(request): Json<CreateTransactionRequest>,
) -> AppResult<(StatusCode, Json<TransactionDetails>)> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let borrower_id = request.borrower_id.unwrap_or(caller.id);
    let lending = &state.services.lending;
    let transaction = lending.request(&caller, borrower_id, request.item_id).await?;

    Ok((StatusCode::CREATED, Json(lending.details(transaction))))
}

/// Issue a requested book (staff)
#[utoipa::path(
    post,
    path = "/transactions/{id}/issue",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Book issued", body = TransactionDetails),
        (status = 403, description = "Staff role required"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Not REQUESTED or no copies available")
    )
)]
pub async fn issue_transaction(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<i32>,
) -> AppResult<Json<TransactionDetails>> {
    let lending = &state.services.lending;
    let transaction = lending.issue(&caller, id).await?;
    Ok(Json(lending.details(transaction)))
}

/// Return an issued book
#[utoipa::path(
    post,
    path = "/transactions/{id}/return",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Book returned", body = TransactionDetails),
        (status = 403, description = "Not the borrower or staff"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Not ISSUED")
    )
)]
pub async fn return_transaction(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<i32>,
) -> AppResult<Json<TransactionDetails>> {
    let lending = &state.services.lending;
    let transaction = lending.return_book(&caller, id).await?;
    Ok(Json(lending.details(transaction)))
}

/// Cancel a request that has not been issued
#[utoipa::path(
    delete,
    path = "/transactions/{id}",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Transaction ID")),
    responses(
        (status = 204, description = "Request cancelled"),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Already issued or returned")
    )
)]
pub async fn cancel_transaction(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.lending.cancel(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get a transaction
#[utoipa::path(
    get,
    path = "/transactions/{id}",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction", body = TransactionDetails),
        (status = 403, description = "Not the borrower or staff"),
        (status = 404, description = "Transaction not found")
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<i32>,
) -> AppResult<Json<TransactionDetails>> {
    let lending = &state.services.lending;
    let transaction = lending.get(&caller, id).await?;
    Ok(Json(lending.details(transaction)))
}

/// List transactions by status
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(TransactionQuery),
    responses(
        (status = 200, description = "Transactions visible to the caller", body = Vec<TransactionDetails>),
        (status = 400, description = "Unrecognized status")
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<TransactionDetails>>> {
    let status: TransactionStatus = query
        .status
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("status query parameter is required".to_string()))?
        .parse()?;

    let lending = &state.services.lending;
    let transactions = lending.list_by_status(&caller, status).await?;
    Ok(Json(
        transactions
            .into_iter()
            .map(|t| lending.details(t))
            .collect(),
    ))
}
