//! Books repository: catalog lookups and the copy-count ledger

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::CatalogItem,
};

use super::{Catalog, InventoryLedger};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
    clamp_overflow: bool,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>, clamp_overflow: bool) -> Self {
        Self { pool, clamp_overflow }
    }

    /// Recompute every counter as `total_copies - ISSUED transactions`.
    ///
    /// Repairs drift left by a crash between a counter update and its
    /// status transition. Returns the number of corrected rows.
    pub async fn reconcile(&self) -> AppResult<u64> {
        let corrected = sqlx::query_as::<_, (i32, i32, i32)>(
            r#"
            WITH expected AS (
                SELECT b.id,
                       b.available_copies AS previous,
                       GREATEST(b.total_copies - COALESCE((
                           SELECT COUNT(*)::int
                           FROM lending_transactions t
                           WHERE t.item_id = b.id AND t.status = 'ISSUED'
                       ), 0), 0) AS available
                FROM books b
            )
            UPDATE books
            SET available_copies = expected.available
            FROM expected
            WHERE books.id = expected.id
              AND books.available_copies <> expected.available
            RETURNING books.id, expected.previous, books.available_copies
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for (id, previous, available) in &corrected {
            tracing::warn!(
                item_id = id,
                previous,
                available,
                "Reconciled available copy counter"
            );
        }

        Ok(corrected.len() as u64)
    }

    async fn exists(&self, item_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl Catalog for BooksRepository {
    async fn get_item(&self, item_id: i32) -> AppResult<CatalogItem> {
        sqlx::query_as::<_, CatalogItem>(
            r#"
            SELECT id, title, author, edition, genre, total_copies, available_copies
            FROM books
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", item_id)))
    }
}

#[async_trait]
impl InventoryLedger for BooksRepository {
    async fn reserve_copy(&self, item_id: i32) -> AppResult<()> {
        // Single guarded statement: the row lock serializes concurrent reservations
        let reserved = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(item_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reserved == 1 {
            return Ok(());
        }

        if self.exists(item_id).await? {
            Err(AppError::InventoryExhausted(item_id))
        } else {
            Err(AppError::NotFound(format!("Book with id {} not found", item_id)))
        }
    }

    async fn release_copy(&self, item_id: i32) -> AppResult<()> {
        let released = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1
            WHERE id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(item_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if released == 1 {
            return Ok(());
        }

        if !self.exists(item_id).await? {
            return Err(AppError::NotFound(format!("Book with id {} not found", item_id)));
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
