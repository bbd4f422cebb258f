use rust_decimal::Decimal;
use thiserror::Error;

pub use expensedb_core::StorageError;

/// Input rejected at the boundary, before any storage access.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("expenses[{index}]: amount must not be negative (got {amount})")]
    NegativeAmount { index: usize, amount: Decimal },
    #[error("expenses[{index}]: category must not be empty")]
    EmptyCategory { index: usize },
    #[error("invalid {field} '{value}': expected a date formatted as YYYY-MM-DD")]
    MalformedDate { field: &'static str, value: String },
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
