//! In-memory storage backend for expensedb.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use rust_decimal::Decimal;
use time::Date;

use expensedb_core::{
    Category, CategoryTotal, ExpenseRecord, StorageBackend, StorageError, StorageTransaction,
    TransactionId,
};

type Days = BTreeMap<Date, Vec<ExpenseRecord>>;

pub struct InMemoryStorage {
    days: RwLock<Days>,
    tx_counter: AtomicU64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            days: RwLock::new(BTreeMap::new()),
            tx_counter: AtomicU64::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Days>, StorageError> {
        self.days
            .read()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Days>, StorageError> {
        self.days
            .write()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl StorageBackend for InMemoryStorage {
    fn fetch_expenses(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        let days = self.read()?;
        Ok(days.get(&date).cloned().unwrap_or_default())
    }

    fn category_totals(&self, from: Date, to: Date) -> Result<Vec<CategoryTotal>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }

        let days = self.read()?;
        let mut sums: HashMap<Category, Decimal> = HashMap::new();
        for (_, records) in days.range((Bound::Included(from), Bound::Included(to))) {
            for record in records {
                let sum = sums.entry(record.category.clone()).or_insert(Decimal::ZERO);
                *sum = sum
                    .checked_add(record.amount)
                    .ok_or_else(|| StorageError::overflow(format!("category {}", record.category)))?;
            }
        }

        let mut result: Vec<CategoryTotal> = sums
            .into_iter()
            .map(|(category, total)| CategoryTotal::new(category, total))
            .collect();
        result.sort_by(|a, b| a.category.as_str().cmp(b.category.as_str()));
        Ok(result)
    }

    fn begin_transaction(&self) -> Result<Box<dyn StorageTransaction + '_>, StorageError> {
        let days = self.write()?;
        let id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tx_id = id, "Transaction started");
        Ok(Box::new(MemoryTransaction {
            id,
            days,
            undo: BTreeMap::new(),
            finished: false,
        }))
    }
}

/// Holds the write lock for its whole lifetime. `undo` keeps the state of
/// every date touched so far, as it was before the transaction began.
struct MemoryTransaction<'a> {
    id: TransactionId,
    days: RwLockWriteGuard<'a, Days>,
    undo: BTreeMap<Date, Option<Vec<ExpenseRecord>>>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn remember(&mut self, date: Date) {
        if !self.undo.contains_key(&date) {
            let prior = self.days.get(&date).cloned();
            self.undo.insert(date, prior);
        }
    }

    fn restore(&mut self) {
        for (date, prior) in std::mem::take(&mut self.undo) {
            match prior {
                Some(records) => {
                    self.days.insert(date, records);
                }
                None => {
                    self.days.remove(&date);
                }
            }
        }
    }
}

impl StorageTransaction for MemoryTransaction<'_> {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn delete_expenses(&mut self, date: Date) -> Result<usize, StorageError> {
        self.remember(date);
        Ok(self.days.remove(&date).map(|records| records.len()).unwrap_or(0))
    }

    fn insert_expense(&mut self, record: &ExpenseRecord) -> Result<(), StorageError> {
        self.remember(record.date);
        self.days.entry(record.date).or_default().push(record.clone());
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.undo.clear();
        self.finished = true;
        tracing::debug!(tx_id = self.id, "Transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.restore();
        self.finished = true;
        tracing::debug!(tx_id = self.id, "Transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.restore();
            tracing::warn!(tx_id = self.id, "Transaction dropped without commit, rolled back");
        }
    }
}
