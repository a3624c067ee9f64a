//! HTTP binding for the lending engine

pub mod books;
pub mod health;
pub mod openapi;
pub mod transactions;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::{CallerIdentity, UserClaims},
    services::access::AccessPolicy,
    AppState,
};

/// Extractor for the authenticated caller from a bearer JWT
pub struct AuthenticatedCaller(pub CallerIdentity);

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let header = value
        .to_str()
        .map_err(|_| AppError::Unauthenticated("Invalid authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| AppError::Unauthenticated("Invalid authorization header format".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = match bearer_token(&parts.headers)? {
            Some(token) => {
                let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
                    .map_err(|e| AppError::Unauthenticated(e.to_string()))?;
                Some(claims.caller())
            }
            None => None,
        };

        Ok(AuthenticatedCaller(AccessPolicy.authenticate(caller)?))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog
        .route("/books/:id", get(books::get_book))
        // Lending
        .route(
            "/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route(
            "/transactions/:id",
            get(transactions::get_transaction).delete(transactions::cancel_transaction),
        )
        .route("/transactions/:id/issue", post(transactions::issue_transaction))
        .route("/transactions/:id/return", post(transactions::return_transaction))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
