//! Data models for the lending engine

pub mod book;
pub mod caller;
pub mod transaction;

// Re-export commonly used types
pub use book::CatalogItem;
pub use caller::{CallerIdentity, Role, UserClaims};
pub use transaction::{
    LendingPolicy, LendingTransaction, TransactionDetails, TransactionStatus, Visibility,
};
