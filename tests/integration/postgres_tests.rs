//! PostgreSQL backend tests
//!
//! These need a reachable database (`DATABASE_URL`, or the default from
//! `AppConfig`). Run with: cargo test --test postgres_tests -- --ignored

use std::sync::Arc;

use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tokio::sync::Mutex;

use lending_server::{
    config::AppConfig,
    models::{CallerIdentity, LendingPolicy, TransactionStatus},
    repository::{
        books::BooksRepository, transactions::TransactionsRepository, Catalog, InventoryLedger,
        Repository, TransactionStore,
    },
    services::{clock::SystemClock, Services},
    AppError,
};

// Reconcile rewrites every counter, so tests sharing the database run one at a time
static DATABASE: Mutex<()> = Mutex::const_new(());

const MISSING_BOOK: i32 = i32::MAX;

async fn connect() -> Pool<Postgres> {
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| AppConfig::default().database.url);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Fresh book row; its id also seeds borrower ids so reruns never collide
async fn insert_book(pool: &Pool<Postgres>, copies: i32) -> i32 {
    sqlx::query_scalar(
        r#"
        INSERT INTO books (title, author, total_copies, available_copies)
        VALUES ('Dune', 'Frank Herbert', $1, $1)
        RETURNING id
        "#,
    )
    .bind(copies)
    .fetch_one(pool)
    .await
    .expect("Failed to insert book")
}

async fn available_copies(pool: &Pool<Postgres>, item_id: i32) -> i32 {
    sqlx::query_scalar("SELECT available_copies FROM books WHERE id = $1")
        .bind(item_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read counter")
}

#[tokio::test]
#[ignore]
async fn test_duplicate_request_and_unknown_book() {
    let _guard = DATABASE.lock().await;
    let pool = connect().await;
    let store = TransactionsRepository::new(pool.clone());
    let book = insert_book(&pool, 1).await;
    let borrower = book * 1000;
    let now = Utc::now();

    store.create_open_request(borrower, book, now).await.unwrap();
    assert!(matches!(
        store.create_open_request(borrower, book, now).await,
        Err(AppError::AlreadyRequested { .. })
    ));

    // Foreign key on item_id
    assert!(matches!(
        store.create_open_request(borrower, MISSING_BOOK, now).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_status_transitions_are_guarded() {
    let _guard = DATABASE.lock().await;
    let pool = connect().await;
    let store = TransactionsRepository::new(pool.clone());
    let policy = LendingPolicy::default();
    let book = insert_book(&pool, 1).await;
    let now = Utc::now();

    let tx = store.create_open_request(book * 1000, book, now).await.unwrap();
    assert!(matches!(
        store.transition_to_returned(tx.id, now, &policy).await,
        Err(AppError::InvalidStateTransition { from: TransactionStatus::Requested, .. })
    ));

    let issued = store.transition_to_issued(tx.id, 100, now, &policy).await.unwrap();
    assert_eq!(issued.status, TransactionStatus::Issued);
    assert_eq!(issued.approved_by, Some(100));

    assert!(matches!(
        store.transition_to_issued(tx.id, 100, now, &policy).await,
        Err(AppError::InvalidStateTransition { from: TransactionStatus::Issued, .. })
    ));
    assert!(matches!(
        store.delete_requested(tx.id).await,
        Err(AppError::InvalidStateTransition { from: TransactionStatus::Issued, .. })
    ));
    assert!(matches!(
        store.transition_to_issued(i32::MAX, 100, now, &policy).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_ledger_exhaustion_and_overflow() {
    let _guard = DATABASE.lock().await;
    let pool = connect().await;
    let strict = BooksRepository::new(pool.clone(), false);
    let clamping = BooksRepository::new(pool.clone(), true);
    let book = insert_book(&pool, 1).await;

    assert_eq!(strict.get_item(book).await.unwrap().available_copies, 1);

    strict.reserve_copy(book).await.unwrap();
    assert!(matches!(
        strict.reserve_copy(book).await,
        Err(AppError::InventoryExhausted(id)) if id == book
    ));
    assert!(matches!(strict.reserve_copy(MISSING_BOOK).await, Err(AppError::NotFound(_))));
    assert_eq!(available_copies(&pool, book).await, 0);

    strict.release_copy(book).await.unwrap();
    assert!(matches!(strict.release_copy(book).await, Err(AppError::Consistency(_))));
    clamping.release_copy(book).await.unwrap();
    assert!(matches!(strict.release_copy(MISSING_BOOK).await, Err(AppError::NotFound(_))));
    assert_eq!(available_copies(&pool, book).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_issue_of_last_copy() {
    let _guard = DATABASE.lock().await;
    let pool = connect().await;
    let book = insert_book(&pool, 1).await;
    let services = Services::new(
        Repository::postgres(pool.clone(), false),
        &AppConfig::default().lending,
        Arc::new(SystemClock),
    );
    let lending = services.lending;
    let staff = CallerIdentity::librarian(100);
    let (a, b) = (
        CallerIdentity::borrower(book * 1000),
        CallerIdentity::borrower(book * 1000 + 1),
    );

    let ta = lending.request(&a, a.id, book).await.unwrap();
    let tb = lending.request(&b, b.id, book).await.unwrap();

    let (l1, l2) = (lending.clone(), lending.clone());
    let h1 = tokio::spawn(async move { l1.issue(&staff, ta.id).await });
    let h2 = tokio::spawn(async move { l2.issue(&staff, tb.id).await });
    let results = [h1.await.unwrap(), h2.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::InventoryExhausted(_))))
            .count(),
        1
    );
    assert_eq!(available_copies(&pool, book).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_revert_return_refuses_reopened_pair() {
    let _guard = DATABASE.lock().await;
    let pool = connect().await;
    let store = TransactionsRepository::new(pool.clone());
    let policy = LendingPolicy::default();
    let book = insert_book(&pool, 1).await;
    let borrower = book * 1000;
    let now = Utc::now();

    let first = store.create_open_request(borrower, book, now).await.unwrap();
    store.transition_to_issued(first.id, 100, now, &policy).await.unwrap();
    store.transition_to_returned(first.id, now, &policy).await.unwrap();
    let second = store.create_open_request(borrower, book, now).await.unwrap();

    assert!(matches!(store.revert_return(first.id).await, Err(AppError::Consistency(_))));
    assert_eq!(
        store.get_by_id(first.id).await.unwrap().status,
        TransactionStatus::Returned
    );

    store.delete_requested(second.id).await.unwrap();
    let reverted = store.revert_return(first.id).await.unwrap();
    assert_eq!(reverted.status, TransactionStatus::Issued);
}

#[tokio::test]
#[ignore]
async fn test_reconcile_repairs_counter_drift() {
    let _guard = DATABASE.lock().await;
    let pool = connect().await;
    let books = BooksRepository::new(pool.clone(), false);
    let store = TransactionsRepository::new(pool.clone());
    let policy = LendingPolicy::default();
    let book = insert_book(&pool, 2).await;
    let now = Utc::now();

    // Bring every counter in line before creating drift on this book
    books.reconcile().await.unwrap();

    let tx = store.create_open_request(book * 1000, book, now).await.unwrap();
    books.reserve_copy(book).await.unwrap();
    store.transition_to_issued(tx.id, 100, now, &policy).await.unwrap();
    assert_eq!(available_copies(&pool, book).await, 1);

    // Crash between a return's status update and its release
    store.transition_to_returned(tx.id, now, &policy).await.unwrap();
    assert_eq!(available_copies(&pool, book).await, 1);

    assert_eq!(books.reconcile().await.unwrap(), 1);
    assert_eq!(available_copies(&pool, book).await, 2);

    // Already consistent
    assert_eq!(books.reconcile().await.unwrap(), 0);
}
