//! Authorization rules for lending operations.
//!
//! Every check here runs before any state is touched, so a denied call has
//! no observable effect.

use crate::{
    error::{AppError, AppResult},
    models::{CallerIdentity, Role, Visibility},
};

/// Lending operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Request,
    Issue,
    Return,
    Cancel,
    View,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Operation::Request => "request",
            Operation::Issue => "issue",
            Operation::Return => "return",
            Operation::Cancel => "cancel",
            Operation::View => "view",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    /// Reject calls that arrive without an identity
    pub fn authenticate(&self, caller: Option<CallerIdentity>) -> AppResult<CallerIdentity> {
        caller.ok_or_else(|| AppError::Unauthenticated("No caller identity".to_string()))
    }

    /// Role-level check that needs no target: borrowers never issue, staff
    /// never request or cancel on a borrower's behalf.
    pub fn require_role(&self, caller: &CallerIdentity, operation: Operation) -> AppResult<()> {
        let allowed = match (caller.role, operation) {
            (Role::Borrower, Operation::Issue) => false,
            (Role::Borrower, _) => true,
            (Role::Librarian, Operation::Request) | (Role::Librarian, Operation::Cancel) => false,
            (Role::Librarian, _) => true,
        };

        if allowed {
            Ok(())
        } else {
            tracing::warn!(
                caller_id = caller.id,
                role = %caller.role,
                operation = %operation,
                "Lending operation denied for role"
            );
            Err(AppError::Forbidden(format!(
                "{} may not {} transactions",
                caller.role, operation
            )))
        }
    }

    /// Decide whether `caller` may perform `operation` on a transaction
    /// (or request) belonging to `owner_id`.
    pub fn authorize(
        &self,
        caller: &CallerIdentity,
        operation: Operation,
        owner_id: i32,
    ) -> AppResult<()> {
        self.require_role(caller, operation)?;

        if caller.role.is_staff() || caller.id == owner_id {
            return Ok(());
        }

        tracing::warn!(
            caller_id = caller.id,
            role = %caller.role,
            operation = %operation,
            owner_id,
            "Lending operation denied"
        );
        Err(AppError::Forbidden(format!(
            "{} may not {} transactions of borrower {}",
            caller.role, operation, owner_id
        )))
    }

    /// Listing filter: staff see everything, borrowers only their own
    pub fn visibility(&self, caller: &CallerIdentity) -> Visibility {
        if caller.role.is_staff() {
            Visibility::All
        } else {
            Visibility::Borrower(caller.id)
        }
    }
}
