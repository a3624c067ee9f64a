//! Lending state machine: request -> issue -> return.
//!
//! Each operation checks the caller's role before reading anything, then
//! authorizes against the current transaction before anything is mutated. Issue and return pair a counter change with a
//! status transition; when the second half fails, the first is compensated.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        CallerIdentity, LendingPolicy, LendingTransaction, TransactionDetails, TransactionStatus,
    },
    repository::Repository,
};

use super::{
    access::{AccessPolicy, Operation},
    clock::Clock,
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    access: AccessPolicy,
    policy: LendingPolicy,
    clock: Arc<dyn Clock>,
}

impl LendingService {
    pub fn new(repository: Repository, policy: LendingPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            access: AccessPolicy,
            policy,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// View of a transaction with its status as of now
    pub fn details(&self, transaction: LendingTransaction) -> TransactionDetails {
        TransactionDetails::from_transaction(transaction, self.now())
    }

    /// Open a REQUESTED transaction. Reserves nothing against the counter.
    pub async fn request(
        &self,
        caller: &CallerIdentity,
        borrower_id: i32,
        item_id: i32,
    ) -> AppResult<LendingTransaction> {
        self.access.authorize(caller, Operation::Request, borrower_id)?;

        // Verify the book exists
        self.repository.catalog.get_item(item_id).await?;

        let transaction = self
            .repository
            .transactions
            .create_open_request(borrower_id, item_id, self.now())
            .await?;

        tracing::info!(
            transaction_id = transaction.id,
            borrower_id,
            item_id,
            "Book requested"
        );
        Ok(transaction)
    }

    /// Hand over a copy: counter -1, REQUESTED -> ISSUED
    pub async fn issue(&self, caller: &CallerIdentity, id: i32) -> AppResult<LendingTransaction> {
        self.access.require_role(caller, Operation::Issue)?;
        let transaction = self.repository.transactions.get_by_id(id).await?;
        self.access.authorize(caller, Operation::Issue, transaction.borrower_id)?;

        if transaction.status != TransactionStatus::Requested {
            return Err(AppError::InvalidStateTransition {
                id,
                from: transaction.status,
                action: "issued",
            });
        }

        let item_id = transaction.item_id;
        self.repository.ledger.reserve_copy(item_id).await?;

        match self
            .repository
            .transactions
            .transition_to_issued(id, caller.id, self.now(), &self.policy)
            .await
        {
            Ok(issued) => {
                tracing::info!(
                    transaction_id = id,
                    item_id,
                    borrower_id = issued.borrower_id,
                    approved_by = caller.id,
                    "Book issued"
                );
                Ok(issued)
            }
            Err(e) => {
                match self.repository.ledger.release_copy(item_id).await {
                    Ok(()) => tracing::warn!(
                        transaction_id = id,
                        item_id,
                        error = %e,
                        "Issue failed, reservation released"
                    ),
                    Err(release_err) => tracing::error!(
                        transaction_id = id,
                        item_id,
                        error = %e,
                        release_error = %release_err,
                        "Issue failed and reservation could not be released"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Take a copy back: ISSUED -> RETURNED, counter +1, late fee computed
    pub async fn return_book(
        &self,
        caller: &CallerIdentity,
        id: i32,
    ) -> AppResult<LendingTransaction> {
        self.access.require_role(caller, Operation::Return)?;
        let transaction = self.repository.transactions.get_by_id(id).await?;
        self.access.authorize(caller, Operation::Return, transaction.borrower_id)?;

        let returned = self
            .repository
            .transactions
            .transition_to_returned(id, self.now(), &self.policy)
            .await?;

        if let Err(e) = self.repository.ledger.release_copy(returned.item_id).await {
            match self.repository.transactions.revert_return(id).await {
                Ok(_) => tracing::warn!(
                    transaction_id = id,
                    item_id = returned.item_id,
                    error = %e,
                    "Copy release failed, return reverted"
                ),
                Err(revert_err) => tracing::error!(
                    transaction_id = id,
                    item_id = returned.item_id,
                    error = %e,
                    revert_error = %revert_err,
                    "Copy release failed and return could not be reverted"
                ),
            }
            return Err(e);
        }

        tracing::info!(
            transaction_id = id,
            item_id = returned.item_id,
            borrower_id = returned.borrower_id,
            late_fee = %returned.late_fee,
            "Book returned"
        );
        Ok(returned)
    }

    /// Withdraw a request that has not been issued yet
    pub async fn cancel(&self, caller: &CallerIdentity, id: i32) -> AppResult<()> {
        self.access.require_role(caller, Operation::Cancel)?;
        let transaction = self.repository.transactions.get_by_id(id).await?;
        self.access.authorize(caller, Operation::Cancel, transaction.borrower_id)?;

        self.repository.transactions.delete_requested(id).await?;

        tracing::info!(
            transaction_id = id,
            item_id = transaction.item_id,
            borrower_id = transaction.borrower_id,
            "Request cancelled"
        );
        Ok(())
    }

    pub async fn get(&self, caller: &CallerIdentity, id: i32) -> AppResult<LendingTransaction> {
        self.access.require_role(caller, Operation::View)?;
        let transaction = self.repository.transactions.get_by_id(id).await?;
        self.access.authorize(caller, Operation::View, transaction.borrower_id)?;
        Ok(transaction)
    }

    /// Transactions in `status`; borrowers only see their own
    pub async fn list_by_status(
        &self,
        caller: &CallerIdentity,
        status: TransactionStatus,
    ) -> AppResult<Vec<LendingTransaction>> {
        let visibility = self.access.visibility(caller);
        self.repository
            .transactions
            .find_by_status(status, visibility, self.now())
            .await
    }
}
