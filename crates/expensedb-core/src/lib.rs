//! Core types and traits for expensedb storage backends.
//!
//! This crate provides the `StorageBackend` and `StorageTransaction` traits
//! and the expense models they exchange, so backends can live in separate
//! crates.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{Category, ExpenseRecord};
pub use models::read::CategoryTotal;
pub use storage::{StorageBackend, StorageError, StorageTransaction, TransactionId};
