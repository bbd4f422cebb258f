use time::Date;

use crate::models::{read::CategoryTotal, ExpenseRecord};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be reached or a statement failed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A stored row could not be decoded back into an expense.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    /// A sum left the range a `Decimal` can represent.
    #[error("total out of range: {0}")]
    Overflow(String),
}

impl StorageError {
    pub fn unavailable(e: impl std::fmt::Display) -> Self {
        StorageError::Unavailable(e.to_string())
    }

    pub fn corrupt(e: impl std::fmt::Display) -> Self {
        StorageError::CorruptRecord(e.to_string())
    }

    pub fn overflow(e: impl std::fmt::Display) -> Self {
        StorageError::Overflow(e.to_string())
    }
}

pub type TransactionId = u64;

/// Read access plus a way to open a write transaction.
///
/// Reads never observe a half-applied transaction.
pub trait StorageBackend: Send + Sync {
    /// All records stored for `date`, in no particular order.
    fn fetch_expenses(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError>;

    /// Per-category sums over the closed interval `[from, to]`. Categories
    /// without records in range are absent. Empty when `from > to`. A sum
    /// that does not fit a `Decimal` is reported as `Overflow`.
    fn category_totals(&self, from: Date, to: Date) -> Result<Vec<CategoryTotal>, StorageError>;

    fn begin_transaction(&self) -> Result<Box<dyn StorageTransaction + '_>, StorageError>;
}

/// A write transaction. Dropping it without `commit` rolls it back.
pub trait StorageTransaction {
    fn id(&self) -> TransactionId;

    /// Removes every record for `date`, returning how many were removed.
    fn delete_expenses(&mut self, date: Date) -> Result<usize, StorageError>;

    fn insert_expense(&mut self, record: &ExpenseRecord) -> Result<(), StorageError>;

    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
