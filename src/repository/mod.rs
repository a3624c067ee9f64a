//! Repository layer: storage seams for the lending engine

pub mod books;
pub mod memory;
pub mod transactions;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{CatalogItem, LendingPolicy, LendingTransaction, TransactionStatus, Visibility},
};

/// Read access to catalog records
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a book, `NotFound` if absent
    async fn get_item(&self, item_id: i32) -> AppResult<CatalogItem>;
}

/// Owner of the available-copy counters.
///
/// Both operations are linearizable per item: a reservation never observes
/// a count another reservation has already consumed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Take one copy off the shelf; `InventoryExhausted` when none is left
    async fn reserve_copy(&self, item_id: i32) -> AppResult<()>;

    /// Put one copy back; never lets the counter exceed the total
    async fn release_copy(&self, item_id: i32) -> AppResult<()>;
}

/// Persistence of lending transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a REQUESTED transaction unless the pair already has an open one.
    /// The check and the insert are a single atomic unit.
    async fn create_open_request(
        &self,
        borrower_id: i32,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<LendingTransaction>;

    async fn get_by_id(&self, id: i32) -> AppResult<LendingTransaction>;

    /// REQUESTED -> ISSUED, setting borrowed and due dates
    async fn transition_to_issued(
        &self,
        id: i32,
        approved_by: i32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> AppResult<LendingTransaction>;

    /// ISSUED -> RETURNED, setting the return date and late fee
    async fn transition_to_returned(
        &self,
        id: i32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> AppResult<LendingTransaction>;

    /// Compensation for a return whose copy release failed: RETURNED -> ISSUED
    async fn revert_return(&self, id: i32) -> AppResult<LendingTransaction>;

    /// Remove a transaction that is still REQUESTED
    async fn delete_requested(&self, id: i32) -> AppResult<()>;

    /// Snapshot of transactions in `status` visible under `visibility`
    async fn find_by_status(
        &self,
        status: TransactionStatus,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LendingTransaction>>;

    /// Storage liveness probe
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Storage handles shared by the services
#[derive(Clone)]
pub struct Repository {
    pub catalog: Arc<dyn Catalog>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub transactions: Arc<dyn TransactionStore>,
}

impl Repository {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn InventoryLedger>,
        transactions: Arc<dyn TransactionStore>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            transactions,
        }
    }

    /// Repository backed by PostgreSQL; catalog and ledger share the `books` table
    pub fn postgres(pool: Pool<Postgres>, clamp_overflow: bool) -> Self {
        let books = Arc::new(books::BooksRepository::new(pool.clone(), clamp_overflow));
        Self {
            catalog: books.clone(),
            ledger: books,
            transactions: Arc::new(transactions::TransactionsRepository::new(pool)),
        }
    }

    /// Repository backed by process memory
    pub fn in_memory(books: Arc<memory::MemoryBooks>) -> Self {
        Self {
            catalog: books.clone(),
            ledger: books,
            transactions: Arc::new(memory::MemoryTransactions::new()),
        }
    }
}
