//! API integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use lending_server::{
    api,
    config::AppConfig,
    models::{CatalogItem, Role, UserClaims},
    repository::{memory::MemoryBooks, Repository},
    services::{clock::SystemClock, Services},
    AppState,
};

const BOOK: i32 = 1;
const LIBRARIAN: i32 = 100;

struct TestApp {
    router: Router,
    secret: String,
}

impl TestApp {
    fn new(copies: i32) -> Self {
        let books = Arc::new(
            MemoryBooks::new().with_item(CatalogItem::new(BOOK, "Dune", "Frank Herbert", copies)),
        );
        let config = AppConfig::default();
        let services = Services::new(
            Repository::in_memory(books),
            &config.lending,
            Arc::new(SystemClock),
        );
        let secret = config.auth.jwt_secret.clone();
        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };

        Self {
            router: api::router(state),
            secret,
        }
    }

    fn token(&self, user_id: i32, role: Role) -> String {
        UserClaims::new(user_id, role, chrono::Duration::hours(1))
            .create_token(&self.secret)
            .expect("Failed to create token")
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Failed to parse response")
        };
        (status, value)
    }

    async fn request_book(&self, token: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/v1/transactions",
            Some(token),
            Some(json!({ "item_id": BOOK })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new(1);
    let (status, body) = app.send(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_missing_or_invalid_token() {
    let app = TestApp::new(1);

    let (status, body) = app
        .send(Method::GET, "/api/v1/transactions?status=ISSUED", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (status, _) = app
        .send(Method::GET, "/api/v1/transactions?status=ISSUED", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lending_lifecycle() {
    let app = TestApp::new(1);
    let alice = app.token(1, Role::Borrower);
    let bob = app.token(2, Role::Borrower);
    let staff = app.token(LIBRARIAN, Role::Librarian);

    let (status, body) = app.request_book(&alice).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "REQUESTED");
    assert_eq!(body["borrower_id"], 1);
    let alice_tx = body["id"].as_i64().unwrap();

    // Borrowers cannot issue
    let (status, body) = app
        .send(Method::POST, &format!("/api/v1/transactions/{}/issue", alice_tx), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, body) = app
        .send(Method::POST, &format!("/api/v1/transactions/{}/issue", alice_tx), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ISSUED");
    assert_eq!(body["approved_by"], LIBRARIAN);
    assert_eq!(body["is_overdue"], false);

    let (_, book) = app.send(Method::GET, "/api/v1/books/1", Some(&bob), None).await;
    assert_eq!(book["available_copies"], 0);

    // Request succeeds, issue fails on the empty shelf
    let (status, body) = app.request_book(&bob).await;
    assert_eq!(status, StatusCode::CREATED);
    let bob_tx = body["id"].as_i64().unwrap();

    let (status, body) = app
        .send(Method::POST, &format!("/api/v1/transactions/{}/issue", bob_tx), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InventoryExhausted");

    // Bob cannot return Alice's book
    let (status, _) = app
        .send(Method::POST, &format!("/api/v1/transactions/{}/return", alice_tx), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::POST, &format!("/api/v1/transactions/{}/return", alice_tx), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "RETURNED");
    assert!(body["return_date"].is_string());

    let (_, book) = app.send(Method::GET, "/api/v1/books/1", Some(&bob), None).await;
    assert_eq!(book["available_copies"], 1);

    let (status, body) = app
        .send(Method::POST, &format!("/api/v1/transactions/{}/issue", bob_tx), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ISSUED");
}

#[tokio::test]
async fn test_borrower_issue_is_forbidden_for_any_id() {
    let app = TestApp::new(1);
    let alice = app.token(1, Role::Borrower);
    let bob = app.token(2, Role::Borrower);

    let (_, body) = app.request_book(&bob).await;
    let bob_tx = body["id"].as_i64().unwrap();

    for id in [bob_tx, 999] {
        let (status, body) = app
            .send(Method::POST, &format!("/api/v1/transactions/{}/issue", id), Some(&alice), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");
    }
}

#[tokio::test]
async fn test_duplicate_request_conflict() {
    let app = TestApp::new(2);
    let alice = app.token(1, Role::Borrower);

    let (status, _) = app.request_book(&alice).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.request_book(&alice).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyRequested");
}

#[tokio::test]
async fn test_list_by_status() {
    let app = TestApp::new(2);
    let alice = app.token(1, Role::Borrower);
    let bob = app.token(2, Role::Borrower);
    let staff = app.token(LIBRARIAN, Role::Librarian);

    app.request_book(&alice).await;
    app.request_book(&bob).await;

    let (status, body) = app
        .send(Method::GET, "/api/v1/transactions?status=REQUESTED", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let own = body.as_array().unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0]["borrower_id"], 1);

    let (_, body) = app
        .send(Method::GET, "/api/v1/transactions?status=REQUESTED", Some(&staff), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = app
        .send(Method::GET, "/api/v1/transactions?status=OVERDUE", Some(&staff), None)
        .await;
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = app
        .send(Method::GET, "/api/v1/transactions?status=LOST", Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidStatus");

    let (status, _) = app
        .send(Method::GET, "/api/v1/transactions", Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_request() {
    let app = TestApp::new(1);
    let alice = app.token(1, Role::Borrower);
    let bob = app.token(2, Role::Borrower);

    let (_, body) = app.request_book(&alice).await;
    let tx = body["id"].as_i64().unwrap();
    let uri = format!("/api/v1/transactions/{}", tx);

    let (status, _) = app.send(Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, body) = app.send(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_invalid_item_id() {
    let app = TestApp::new(1);
    let alice = app.token(1, Role::Borrower);

    let (status, body) = app
        .send(Method::POST, "/api/v1/transactions", Some(&alice), Some(json!({ "item_id": 0 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, _) = app
        .send(Method::POST, "/api/v1/transactions", Some(&alice), Some(json!({ "item_id": 42 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// Tests below run against a live server backed by PostgreSQL.

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn live_token(user_id: i32, role: Role) -> String {
    let secret = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "change-this-secret-in-production".to_string());
    UserClaims::new(user_id, role, chrono::Duration::hours(1))
        .create_token(&secret)
        .expect("Failed to create token")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_live_health_check() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
#[ignore]
async fn test_live_list_requires_valid_status() {
    let client = reqwest::Client::new();
    let token = live_token(LIBRARIAN, Role::Librarian);

    let response = client
        .get(format!("{}/transactions?status=ISSUED", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/transactions?status=BORROWED", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);
}
