//! PostgreSQL storage backend for expensedb.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, MutexGuard,
};

use postgres::{Client, NoTls, Row};
use rust_decimal::Decimal;
use time::Date;

use expensedb_core::{
    Category, CategoryTotal, ExpenseRecord, StorageBackend, StorageError, StorageTransaction,
    TransactionId,
};

pub struct PostgresStorage {
    client: Mutex<Client>,
    tx_counter: AtomicU64,
}

impl PostgresStorage {
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::connect(connection_string, NoTls).map_err(|e| {
            StorageError::Unavailable(format!("PostgreSQL connection failed: {}", e))
        })?;

        let storage = Self {
            client: Mutex::new(client),
            tx_counter: AtomicU64::new(1),
        };
        storage.init_schema()?;
        tracing::debug!("PostgreSQL storage connected");
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Client>, StorageError> {
        self.client
            .lock()
            .map_err(|_| StorageError::Unavailable("postgres client lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut client = self.lock()?;
        client
            .batch_execute(
                "
            CREATE TABLE IF NOT EXISTS expenses (
                id BIGSERIAL PRIMARY KEY,
                expense_date DATE NOT NULL,
                amount NUMERIC NOT NULL CHECK (amount >= 0),
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

fn row_to_record(row: &Row) -> Result<ExpenseRecord, StorageError> {
    let date: Date = row.try_get(0).map_err(StorageError::corrupt)?;
    let amount: Decimal = row.try_get(1).map_err(StorageError::corrupt)?;
    let category: String = row.try_get(2).map_err(StorageError::corrupt)?;
    let notes: Option<String> = row.try_get(3).map_err(StorageError::corrupt)?;
    Ok(ExpenseRecord::new(date, amount, Category::parse(&category), notes))
}

impl StorageBackend for PostgresStorage {
    fn fetch_expenses(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        let mut client = self.lock()?;
        let rows = client
            .query(
                "SELECT expense_date, amount, category, notes
                 FROM expenses
                 WHERE expense_date = $1
                 ORDER BY id",
                &[&date],
            )
            .map_err(StorageError::unavailable)?;

        let result = rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(date = %date, count = result.len(), "Fetched expenses");
        Ok(result)
    }

    fn category_totals(&self, from: Date, to: Date) -> Result<Vec<CategoryTotal>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }

        let mut client = self.lock()?;
        let rows = client
            .query(
                "SELECT category, SUM(amount)
                 FROM expenses
                 WHERE expense_date BETWEEN $1 AND $2
                 GROUP BY category
                 ORDER BY category",
                &[&from, &to],
            )
            .map_err(StorageError::unavailable)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let category: String = row.try_get(0).map_err(StorageError::corrupt)?;
            // SUM over NUMERIC is unbounded; only the decode can fail
            let total: Decimal = row
                .try_get(1)
                .map_err(|e| StorageError::overflow(format!("category {}: {}", category, e)))?;
            result.push(CategoryTotal::new(Category::parse(&category), total));
        }
        Ok(result)
    }

    fn begin_transaction(&self) -> Result<Box<dyn StorageTransaction + '_>, StorageError> {
        let mut client = self.lock()?;
        client
            .batch_execute("BEGIN")
            .map_err(StorageError::unavailable)?;
        let id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tx_id = id, "PostgreSQL transaction started");
        Ok(Box::new(PostgresTransaction {
            id,
            client,
            finished: false,
        }))
    }
}

struct PostgresTransaction<'a> {
    id: TransactionId,
    client: MutexGuard<'a, Client>,
    finished: bool,
}

impl StorageTransaction for PostgresTransaction<'_> {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn delete_expenses(&mut self, date: Date) -> Result<usize, StorageError> {
        let removed = self
            .client
            .execute("DELETE FROM expenses WHERE expense_date = $1", &[&date])
            .map_err(StorageError::unavailable)?;
        Ok(removed as usize)
    }

    fn insert_expense(&mut self, record: &ExpenseRecord) -> Result<(), StorageError> {
        self.client
            .execute(
                "INSERT INTO expenses (expense_date, amount, category, notes) VALUES ($1, $2, $3, $4)",
                &[
                    &record.date,
                    &record.amount,
                    &record.category.as_str(),
                    &record.notes,
                ],
            )
            .map_err(StorageError::unavailable)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.client
            .batch_execute("COMMIT")
            .map_err(StorageError::unavailable)?;
        self.finished = true;
        tracing::debug!(tx_id = self.id, "PostgreSQL transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        self.client
            .batch_execute("ROLLBACK")
            .map_err(StorageError::unavailable)?;
        tracing::debug!(tx_id = self.id, "PostgreSQL transaction rolled back");
        Ok(())
    }
}

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.client.batch_execute("ROLLBACK") {
            Ok(()) => tracing::warn!(tx_id = self.id, "PostgreSQL transaction dropped without commit, rolled back"),
            Err(e) => tracing::error!(tx_id = self.id, error = %e, "PostgreSQL rollback on drop failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::date;

    /// Runs only against a live server, e.g.
    /// `EXPENSEDB_TEST_POSTGRES_URL=postgres://postgres@localhost/expensedb_test`.
    fn test_storage() -> Option<PostgresStorage> {
        let url = std::env::var("EXPENSEDB_TEST_POSTGRES_URL").ok()?;
        Some(PostgresStorage::new(&url).expect("connect to test database"))
    }

    #[test]
    fn test_postgres_replace_and_totals() {
        let Some(storage) = test_storage() else {
            return;
        };
        let first = date!(1999 - 01 - 01);
        let second = date!(1999 - 01 - 02);

        let mut tx = storage.begin_transaction().unwrap();
        tx.delete_expenses(first).unwrap();
        tx.delete_expenses(second).unwrap();
        tx.insert_expense(&ExpenseRecord::new(first, dec!(0.10), Category::Food, None))
            .unwrap();
        tx.insert_expense(&ExpenseRecord::new(second, dec!(0.20), Category::Food, Some(String::new())))
            .unwrap();
        tx.insert_expense(&ExpenseRecord::new(second, dec!(200), Category::Rent, None))
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(storage.fetch_expenses(first).unwrap().len(), 1);
        let totals = storage.category_totals(first, second).unwrap();
        assert_eq!(
            totals,
            vec![
                CategoryTotal::new(Category::Food, dec!(0.30)),
                CategoryTotal::new(Category::Rent, dec!(200)),
            ]
        );

        let mut tx = storage.begin_transaction().unwrap();
        tx.delete_expenses(first).unwrap();
        tx.rollback().unwrap();
        assert_eq!(storage.fetch_expenses(first).unwrap().len(), 1);

        let mut tx = storage.begin_transaction().unwrap();
        tx.delete_expenses(first).unwrap();
        tx.delete_expenses(second).unwrap();
        tx.commit().unwrap();
        assert!(storage.fetch_expenses(second).unwrap().is_empty());
    }
}
