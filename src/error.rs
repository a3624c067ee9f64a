//! Error types for the lending server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::transaction::TransactionStatus;

/// Stable numeric error codes exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    DbFailure = 3,
    NotFound = 4,
    AlreadyRequested = 5,
    InventoryExhausted = 6,
    InvalidStateTransition = 7,
    InvalidStatus = 8,
    Forbidden = 9,
    BadValue = 10,
    InventoryInconsistent = 11,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Borrower {borrower_id} already has an open request for item {item_id}")]
    AlreadyRequested { borrower_id: i32, item_id: i32 },

    #[error("No copies of item {0} are available")]
    InventoryExhausted(i32),

    #[error("Transaction {id} is {from} and cannot be {action}")]
    InvalidStateTransition {
        id: i32,
        from: TransactionStatus,
        action: &'static str,
    },

    #[error("Unrecognized transaction status: {0}")]
    InvalidStatus(String),

    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Inventory consistency violation: {0}")]
    Consistency(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::AlreadyRequested { .. } => ErrorCode::AlreadyRequested,
            AppError::InventoryExhausted(_) => ErrorCode::InventoryExhausted,
            AppError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            AppError::InvalidStatus(_) => ErrorCode::InvalidStatus,
            AppError::Unauthenticated(_) => ErrorCode::NotAuthenticated,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::BadRequest(_) => ErrorCode::BadValue,
            AppError::Persistence(_) => ErrorCode::DbFailure,
            AppError::Consistency(_) => ErrorCode::InventoryInconsistent,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyRequested { .. }
            | AppError::InventoryExhausted(_)
            | AppError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            AppError::InvalidStatus(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Persistence(_) | AppError::Consistency(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Server-side failures are logged here and masked in the body
        let message = match &self {
            AppError::Persistence(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Consistency(msg) => {
                tracing::error!("Inventory consistency violation: {}", msg);
                "Inventory consistency violation".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
