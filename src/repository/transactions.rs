//! Lending transactions repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{LendingPolicy, LendingTransaction, TransactionStatus, Visibility},
};

use super::TransactionStore;

const COLUMNS: &str = "id, borrower_id, item_id, approved_by, requested_at, borrowed_date, \
                       due_date, return_date, status, late_fee";

fn pair_reopened(transaction: &LendingTransaction) -> AppError {
    AppError::Consistency(format!(
        "transaction {} cannot be reopened: borrower {} already has an open transaction for item {}",
        transaction.id, transaction.borrower_id, transaction.item_id
    ))
}

#[derive(Clone)]
pub struct TransactionsRepository {
    pool: Pool<Postgres>,
}

impl TransactionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Turn a failed compare-and-swap on status into the right error
    async fn transition_error(&self, id: i32, action: &'static str) -> AppError {
        match self.get_by_id(id).await {
            Ok(current) => AppError::InvalidStateTransition {
                id,
                from: current.status,
                action,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TransactionStore for TransactionsRepository {
    async fn create_open_request(
        &self,
        borrower_id: i32,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<LendingTransaction> {
        // The partial unique index on open (borrower, item) pairs closes the race
        sqlx::query_as::<_, LendingTransaction>(&format!(
            r#"
            INSERT INTO lending_transactions (borrower_id, item_id, requested_at, status, late_fee)
            VALUES ($1, $2, $3, 'REQUESTED', 0)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(borrower_id)
        .bind(item_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::AlreadyRequested { borrower_id, item_id }
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                AppError::NotFound(format!("Book with id {} not found", item_id))
            }
            other => AppError::Persistence(other),
        })
    }

    async fn get_by_id(&self, id: i32) -> AppResult<LendingTransaction> {
        sqlx::query_as::<_, LendingTransaction>(&format!(
            "SELECT {COLUMNS} FROM lending_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))
    }

    async fn transition_to_issued(
        &self,
        id: i32,
        approved_by: i32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> AppResult<LendingTransaction> {
        let updated = sqlx::query_as::<_, LendingTransaction>(&format!(
            r#"
            UPDATE lending_transactions
            SET status = 'ISSUED', approved_by = $2, borrowed_date = $3, due_date = $4
            WHERE id = $1 AND status = 'REQUESTED'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(approved_by)
        .bind(now)
        .bind(policy.due_date(now))
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(transaction) => Ok(transaction),
            None => Err(self.transition_error(id, "issued").await),
        }
    }

    async fn transition_to_returned(
        &self,
        id: i32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> AppResult<LendingTransaction> {
        let current = self.get_by_id(id).await?;
        if current.status != TransactionStatus::Issued {
            return Err(AppError::InvalidStateTransition {
                id,
                from: current.status,
                action: "returned",
            });
        }

        // Due date is fixed once issued, so the fee computed here stays valid
        // as long as the status is still ISSUED when the update lands.
        let late_fee = current
            .due_date
            .map(|due| policy.late_fee(due, now))
            .unwrap_or_default();

        let updated = sqlx::query_as::<_, LendingTransaction>(&format!(
            r#"
            UPDATE lending_transactions
            SET status = 'RETURNED', return_date = $2, late_fee = $3
            WHERE id = $1 AND status = 'ISSUED'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .bind(late_fee)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(transaction) => Ok(transaction),
            None => Err(self.transition_error(id, "returned").await),
        }
    }

    async fn revert_return(&self, id: i32) -> AppResult<LendingTransaction> {
        // Refuses to reopen when the pair already has a newer open transaction
        let updated = sqlx::query_as::<_, LendingTransaction>(&format!(
            r#"
            UPDATE lending_transactions t
            SET status = 'ISSUED', return_date = NULL, late_fee = 0
            WHERE t.id = $1 AND t.status = 'RETURNED'
              AND NOT EXISTS (
                  SELECT 1 FROM lending_transactions o
                  WHERE o.borrower_id = t.borrower_id
                    AND o.item_id = t.item_id
                    AND o.id <> t.id
                    AND o.status IN ('REQUESTED', 'ISSUED')
              )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match updated {
            Ok(Some(transaction)) => Ok(transaction),
            Ok(None) => match self.get_by_id(id).await? {
                current if current.status == TransactionStatus::Returned => {
                    Err(pair_reopened(&current))
                }
                current => Err(AppError::InvalidStateTransition {
                    id,
                    from: current.status,
                    action: "reopened",
                }),
            },
            Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
                let current = self.get_by_id(id).await?;
                Err(pair_reopened(&current))
            }
            Err(e) => Err(AppError::Persistence(e)),
        }
    }

    async fn delete_requested(&self, id: i32) -> AppResult<()> {
        let deleted = sqlx::query(
            "DELETE FROM lending_transactions WHERE id = $1 AND status = 'REQUESTED'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if deleted == 1 {
            Ok(())
        } else {
            Err(self.transition_error(id, "cancelled").await)
        }
    }

    async fn find_by_status(
        &self,
        status: TransactionStatus,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LendingTransaction>> {
        let borrower_id = visibility.borrower_id();

        let transactions = match status {
            TransactionStatus::Overdue => {
                sqlx::query_as::<_, LendingTransaction>(&format!(
                    r#"
                    SELECT {COLUMNS} FROM lending_transactions
                    WHERE status = 'ISSUED' AND due_date < $1
                      AND ($2::int IS NULL OR borrower_id = $2)
                    ORDER BY due_date, id
                    "#
                ))
                .bind(now)
                .bind(borrower_id)
                .fetch_all(&self.pool)
                .await?
            }
            stored => {
                sqlx::query_as::<_, LendingTransaction>(&format!(
                    r#"
                    SELECT {COLUMNS} FROM lending_transactions
                    WHERE status = $1
                      AND ($2::int IS NULL OR borrower_id = $2)
                    ORDER BY requested_at, id
                    "#
                ))
                .bind(stored)
                .bind(borrower_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(transactions)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
