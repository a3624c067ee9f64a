//! Lending transaction model and related types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;

use crate::{config::LendingConfig, error::AppError};

/// Lifecycle status of a lending transaction.
///
/// `Overdue` is never stored: it is the read-time view of an `Issued`
/// transaction whose due date has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Requested,
    Issued,
    Returned,
    Overdue,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Requested => "REQUESTED",
            TransactionStatus::Issued => "ISSUED",
            TransactionStatus::Returned => "RETURNED",
            TransactionStatus::Overdue => "OVERDUE",
        }
    }

    /// REQUESTED and ISSUED transactions count against the one-open-per-pair rule
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::Requested | TransactionStatus::Issued)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" => Ok(TransactionStatus::Requested),
            "ISSUED" => Ok(TransactionStatus::Issued),
            "RETURNED" => Ok(TransactionStatus::Returned),
            "OVERDUE" => Ok(TransactionStatus::Overdue),
            _ => Err(AppError::InvalidStatus(s.to_string())),
        }
    }
}

// SQLx conversion for TransactionStatus (stored as TEXT)
impl sqlx::Type<Postgres> for TransactionStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for TransactionStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse()
            .map_err(|_| format!("unknown transaction status in database: {}", s).into())
    }
}

impl Encode<'_, Postgres> for TransactionStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Lending transaction as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LendingTransaction {
    pub id: i32,
    pub borrower_id: i32,
    pub item_id: i32,
    /// Staff member who issued the copy
    pub approved_by: Option<i32>,
    pub requested_at: DateTime<Utc>,
    pub borrowed_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub late_fee: Decimal,
}

impl LendingTransaction {
    /// Fresh REQUESTED transaction
    pub fn requested(id: i32, borrower_id: i32, item_id: i32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            borrower_id,
            item_id,
            approved_by: None,
            requested_at: now,
            borrowed_date: None,
            due_date: None,
            return_date: None,
            status: TransactionStatus::Requested,
            late_fee: Decimal::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Issued && self.due_date.map(|d| d < now).unwrap_or(false)
    }

    /// Status as seen by readers at `now`
    pub fn effective_status(&self, now: DateTime<Utc>) -> TransactionStatus {
        if self.is_overdue(now) {
            TransactionStatus::Overdue
        } else {
            self.status
        }
    }

    /// Whether this transaction belongs in a listing for `status` at `now`
    pub fn matches_status(&self, status: TransactionStatus, now: DateTime<Utc>) -> bool {
        match status {
            TransactionStatus::Overdue => self.is_overdue(now),
            other => self.status == other,
        }
    }
}

/// Which transactions a caller is allowed to see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    Borrower(i32),
}

impl Visibility {
    pub fn borrower_id(&self) -> Option<i32> {
        match self {
            Visibility::All => None,
            Visibility::Borrower(id) => Some(*id),
        }
    }

    pub fn allows(&self, transaction: &LendingTransaction) -> bool {
        match self {
            Visibility::All => true,
            Visibility::Borrower(id) => transaction.borrower_id == *id,
        }
    }
}

/// Loan period and late fee rate applied by the store
#[derive(Debug, Clone, PartialEq)]
pub struct LendingPolicy {
    pub loan_period: Duration,
    pub late_fee_per_day: Decimal,
}

impl LendingPolicy {
    pub fn new(loan_period_days: i64, late_fee_per_day: Decimal) -> Self {
        Self {
            loan_period: Duration::days(loan_period_days),
            late_fee_per_day,
        }
    }

    pub fn due_date(&self, borrowed: DateTime<Utc>) -> DateTime<Utc> {
        borrowed + self.loan_period
    }

    /// Whole days past `due`, never negative
    pub fn days_late(&self, due: DateTime<Utc>, returned: DateTime<Utc>) -> i64 {
        (returned - due).num_days().max(0)
    }

    pub fn late_fee(&self, due: DateTime<Utc>, returned: DateTime<Utc>) -> Decimal {
        let fee = Decimal::from(self.days_late(due, returned)) * self.late_fee_per_day;
        fee.max(Decimal::ZERO)
    }
}

impl From<&LendingConfig> for LendingPolicy {
    fn from(config: &LendingConfig) -> Self {
        Self::new(config.loan_period_days, config.late_fee_per_day)
    }
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self::from(&LendingConfig::default())
    }
}

/// Transaction as returned to callers, with its read-time status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionDetails {
    pub id: i32,
    pub borrower_id: i32,
    pub item_id: i32,
    pub approved_by: Option<i32>,
    pub requested_at: DateTime<Utc>,
    pub borrowed_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    #[schema(value_type = String)]
    pub late_fee: Decimal,
    pub is_overdue: bool,
}

impl TransactionDetails {
    pub fn from_transaction(transaction: LendingTransaction, now: DateTime<Utc>) -> Self {
        let status = transaction.effective_status(now);
        Self {
            id: transaction.id,
            borrower_id: transaction.borrower_id,
            item_id: transaction.item_id,
            approved_by: transaction.approved_by,
            requested_at: transaction.requested_at,
            borrowed_date: transaction.borrowed_date,
            due_date: transaction.due_date,
            return_date: transaction.return_date,
            status,
            late_fee: transaction.late_fee,
            is_overdue: status == TransactionStatus::Overdue,
        }
    }
}
