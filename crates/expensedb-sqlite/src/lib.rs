//! SQLite storage backend for expensedb.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use time::{macros::format_description, Date};

use expensedb_core::{
    Category, CategoryTotal, ExpenseRecord, StorageBackend, StorageError, StorageTransaction,
    TransactionId,
};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
    tx_counter: AtomicU64,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(StorageError::unavailable)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(StorageError::unavailable)?;

        let storage = Self {
            conn: Mutex::new(conn),
            tx_counter: AtomicU64::new(1),
        };
        storage.init_schema()?;
        tracing::debug!(path, "SQLite storage opened");
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                expense_date TEXT NOT NULL,
                amount TEXT NOT NULL,
                category TEXT NOT NULL,
                notes TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_date
                ON expenses(expense_date);
            ",
        )
        .map_err(StorageError::unavailable)?;
        Ok(())
    }
}

fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

fn str_to_date(s: &str) -> Result<Date, StorageError> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| StorageError::corrupt(format!("invalid date '{}': {}", s, e)))
}

fn str_to_amount(s: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(s).map_err(|e| StorageError::corrupt(format!("invalid amount '{}': {}", s, e)))
}

impl StorageBackend for SqliteStorage {
    fn fetch_expenses(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT expense_date, amount, category, notes
                 FROM expenses
                 WHERE expense_date = ?1
                 ORDER BY id",
            )
            .map_err(StorageError::unavailable)?;

        let rows = stmt
            .query_map(params![date_to_str(date)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(StorageError::unavailable)?;

        let mut result = Vec::new();
        for row in rows {
            let (date_str, amount_str, category, notes) = row.map_err(StorageError::unavailable)?;
            result.push(ExpenseRecord::new(
                str_to_date(&date_str)?,
                str_to_amount(&amount_str)?,
                Category::parse(&category),
                notes,
            ));
        }
        tracing::debug!(date = %date, count = result.len(), "Fetched expenses");
        Ok(result)
    }

    fn category_totals(&self, from: Date, to: Date) -> Result<Vec<CategoryTotal>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;

        // Amounts are decimal text; SUM() would go through REAL, so the
        // grouping is done here over rows already ordered by category.
        let mut stmt = conn
            .prepare(
                "SELECT category, amount
                 FROM expenses
                 WHERE expense_date BETWEEN ?1 AND ?2
                 ORDER BY category",
            )
            .map_err(StorageError::unavailable)?;

        let rows = stmt
            .query_map(params![date_to_str(from), date_to_str(to)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(StorageError::unavailable)?;

        let mut result: Vec<(String, Decimal)> = Vec::new();
        for row in rows {
            let (category, amount_str) = row.map_err(StorageError::unavailable)?;
            let amount = str_to_amount(&amount_str)?;
            match result.last_mut() {
                Some((last, total)) if *last == category => {
                    *total = total
                        .checked_add(amount)
                        .ok_or_else(|| StorageError::overflow(format!("category {}", category)))?;
                }
                _ => result.push((category, amount)),
            }
        }

        Ok(result
            .into_iter()
            .map(|(category, total)| CategoryTotal::new(Category::parse(&category), total))
            .collect())
    }

    fn begin_transaction(&self) -> Result<Box<dyn StorageTransaction + '_>, StorageError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(StorageError::unavailable)?;
        let id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tx_id = id, "SQLite transaction started");
        Ok(Box::new(SqliteTransaction {
            id,
            conn,
            finished: false,
        }))
    }
}

/// Keeps the connection locked from `BEGIN` until `COMMIT`/`ROLLBACK`.
struct SqliteTransaction<'a> {
    id: TransactionId,
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl StorageTransaction for SqliteTransaction<'_> {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn delete_expenses(&mut self, date: Date) -> Result<usize, StorageError> {
        self.conn
            .execute(
                "DELETE FROM expenses WHERE expense_date = ?1",
                params![date_to_str(date)],
            )
            .map_err(StorageError::unavailable)
    }

    fn insert_expense(&mut self, record: &ExpenseRecord) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO expenses (expense_date, amount, category, notes) VALUES (?1, ?2, ?3, ?4)",
                params![
                    date_to_str(record.date),
                    record.amount.to_string(),
                    record.category.as_str(),
                    record.notes.as_deref()
                ],
            )
            .map_err(StorageError::unavailable)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(StorageError::unavailable)?;
        self.finished = true;
        tracing::debug!(tx_id = self.id, "SQLite transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(StorageError::unavailable)?;
        tracing::debug!(tx_id = self.id, "SQLite transaction rolled back");
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => tracing::warn!(tx_id = self.id, "SQLite transaction dropped without commit, rolled back"),
            Err(e) => tracing::error!(tx_id = self.id, error = %e, "SQLite rollback on drop failed"),
        }
    }
}
