//! In-process storage backends.
//!
//! Each operation runs inside one mutex critical section, which gives the same
//! atomicity the PostgreSQL backends get from guarded single-statement updates.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    models::{
        CatalogItem, LendingPolicy, LendingTransaction, TransactionStatus, Visibility,
    },
};

use super::{Catalog, InventoryLedger, TransactionStore};

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
}

fn book_not_found(item_id: i32) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", item_id))
}

/// Catalog and ledger sharing one map of books
#[derive(Default)]
pub struct MemoryBooks {
    books: Mutex<HashMap<i32, CatalogItem>>,
    clamp_overflow: bool,
}

impl MemoryBooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release on a full counter becomes a logged no-op
    pub fn clamping(mut self) -> Self {
        self.clamp_overflow = true;
        self
    }

    pub fn with_item(self, item: CatalogItem) -> Self {
        if let Ok(mut books) = self.books.lock() {
            books.insert(item.id, item);
        }
        self
    }

    pub fn available_copies(&self, item_id: i32) -> AppResult<i32> {
        lock(&self.books)?
            .get(&item_id)
            .map(|b| b.available_copies)
            .ok_or_else(|| book_not_found(item_id))
    }
}

#[async_trait]
impl Catalog for MemoryBooks {
    async fn get_item(&self, item_id: i32) -> AppResult<CatalogItem> {
        lock(&self.books)?
            .get(&item_id)
            .cloned()
            .ok_or_else(|| book_not_found(item_id))
    }
}

#[async_trait]
impl InventoryLedger for MemoryBooks {
    async fn reserve_copy(&self, item_id: i32) -> AppResult<()> {
        let mut books = lock(&self.books)?;
        let book = books.get_mut(&item_id).ok_or_else(|| book_not_found(item_id))?;
        if book.available_copies <= 0 {
            return Err(AppError::InventoryExhausted(item_id));
        }
        book.available_copies -= 1;
        Ok(())
    }

    async fn release_copy(&self, item_id: i32) -> AppResult<()> {
        let mut books = lock(&self.books)?;
        let book = books.get_mut(&item_id).ok_or_else(|| book_not_found(item_id))?;
        if book.available_copies < book.total_copies {
            book.available_copies += 1;
            return Ok(());
        }

        if self.clamp_overflow {
            tracing::warn!(item_id, "Release on a full counter clamped at total copies");
            Ok(())
        } else {
            tracing::error!(item_id, "Release would exceed total copies");
            Err(AppError::Consistency(format!(
                "available copies of item {} already equal total copies",
                item_id
            )))
        }
    }
}

fn pair_reopened(transaction: &LendingTransaction) -> AppError {
    AppError::Consistency(format!(
        "transaction {} cannot be reopened: borrower {} already has an open transaction for item {}",
        transaction.id, transaction.borrower_id, transaction.item_id
    ))
}

#[derive(Default)]
struct TransactionTable {
    next_id: i32,
    rows: BTreeMap<i32, LendingTransaction>,
}

impl TransactionTable {
    fn get_mut(&mut self, id: i32) -> AppResult<&mut LendingTransaction> {
        self.rows
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))
    }
}

/// Transaction store kept in process memory
#[derive(Default)]
pub struct MemoryTransactions {
    table: Mutex<TransactionTable>,
}

impl MemoryTransactions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactions {
    async fn create_open_request(
        &self,
        borrower_id: i32,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<LendingTransaction> {
        let mut table = lock(&self.table)?;

        let duplicate = table
            .rows
            .values()
            .any(|t| t.borrower_id == borrower_id && t.item_id == item_id && t.is_open());
        if duplicate {
            return Err(AppError::AlreadyRequested { borrower_id, item_id });
        }

        table.next_id += 1;
        let transaction = LendingTransaction::requested(table.next_id, borrower_id, item_id, now);
        table.rows.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<LendingTransaction> {
        let mut table = lock(&self.table)?;
        table.get_mut(id).map(|t| t.clone())
    }

    async fn transition_to_issued(
        &self,
        id: i32,
        approved_by: i32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> AppResult<LendingTransaction> {
        let mut table = lock(&self.table)?;
        let transaction = table.get_mut(id)?;
        if transaction.status != TransactionStatus::Requested {
            return Err(AppError::InvalidStateTransition {
                id,
                from: transaction.status,
                action: "issued",
            });
        }

        transaction.status = TransactionStatus::Issued;
        transaction.approved_by = Some(approved_by);
        transaction.borrowed_date = Some(now);
        transaction.due_date = Some(policy.due_date(now));
        Ok(transaction.clone())
    }

    async fn transition_to_returned(
        &self,
        id: i32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> AppResult<LendingTransaction> {
        let mut table = lock(&self.table)?;
        let transaction = table.get_mut(id)?;
        if transaction.status != TransactionStatus::Issued {
            return Err(AppError::InvalidStateTransition {
                id,
                from: transaction.status,
                action: "returned",
            });
        }

        transaction.status = TransactionStatus::Returned;
        transaction.return_date = Some(now);
        transaction.late_fee = transaction
            .due_date
            .map(|due| policy.late_fee(due, now))
            .unwrap_or_default();
        Ok(transaction.clone())
    }

    async fn revert_return(&self, id: i32) -> AppResult<LendingTransaction> {
        let mut table = lock(&self.table)?;
        let current = table.get_mut(id)?.clone();
        if current.status != TransactionStatus::Returned {
            return Err(AppError::InvalidStateTransition {
                id,
                from: current.status,
                action: "reopened",
            });
        }

        let reopened = table.rows.values().any(|t| {
            t.id != id
                && t.borrower_id == current.borrower_id
                && t.item_id == current.item_id
                && t.is_open()
        });
        if reopened {
            return Err(pair_reopened(&current));
        }

        let transaction = table.get_mut(id)?;
        transaction.status = TransactionStatus::Issued;
        transaction.return_date = None;
        transaction.late_fee = Decimal::ZERO;
        Ok(transaction.clone())
    }

    async fn delete_requested(&self, id: i32) -> AppResult<()> {
        let mut table = lock(&self.table)?;
        let status = table.get_mut(id)?.status;
        if status != TransactionStatus::Requested {
            return Err(AppError::InvalidStateTransition {
                id,
                from: status,
                action: "cancelled",
            });
        }
        table.rows.remove(&id);
        Ok(())
    }

    async fn find_by_status(
        &self,
        status: TransactionStatus,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LendingTransaction>> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .values()
            .filter(|t| t.matches_status(status, now) && visibility.allows(t))
            .cloned()
            .collect())
    }
}
