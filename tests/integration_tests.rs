use std::{collections::HashSet, sync::Arc};

use expensedb::error::{ServiceError, StorageError};
use expensedb::models::write::CandidateExpense;
use expensedb::models::{Category, CategoryTotal, DateRange, ExpenseRecord};
use expensedb::service::ExpenseService;
use expensedb::storage::{
    InMemoryStorage, SqliteStorage, StorageBackend, StorageTransaction, TransactionId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::{macros::date, Date};

fn backends() -> Vec<(&'static str, ExpenseService)> {
    vec![
        ("memory", ExpenseService::new(Arc::new(InMemoryStorage::new()))),
        (
            "sqlite",
            ExpenseService::new(Arc::new(SqliteStorage::new(":memory:").expect("open sqlite"))),
        ),
    ]
}

fn candidate(amount: Decimal, category: &str, notes: &str) -> CandidateExpense {
    CandidateExpense::new(amount, category, Some(notes))
}

fn as_set(records: Vec<ExpenseRecord>) -> HashSet<ExpenseRecord> {
    records.into_iter().collect()
}

#[test]
fn test_replace_filters_empty_rows() {
    for (name, service) in backends() {
        let day = date!(2024 - 08 - 01);
        service
            .replace_expenses_for_date(
                day,
                vec![candidate(dec!(50), "Food", ""), candidate(dec!(0), "Rent", "")],
            )
            .expect("replace");

        let stored = service.fetch_expenses_for_date(day).expect("fetch");
        assert_eq!(
            stored,
            vec![ExpenseRecord::new(day, dec!(50), Category::Food, Some(String::new()))],
            "backend {}",
            name
        );
        assert!(stored.iter().all(|r| !r.amount.is_zero()), "backend {}", name);
    }
}

#[test]
fn test_fetch_returns_exactly_what_was_written() {
    for (name, service) in backends() {
        let day = date!(2024 - 08 - 02);
        let rows = vec![
            candidate(dec!(12.40), "Food", "groceries"),
            candidate(dec!(3.10), "Food", "coffee"),
            candidate(dec!(60), "Entertainment", "concert"),
            CandidateExpense::new(dec!(8.99), "Streaming", None),
        ];
        service
            .replace_expenses_for_date(day, rows.clone())
            .expect("replace");

        let expected: HashSet<ExpenseRecord> = rows.into_iter().map(|c| c.into_record(day)).collect();
        let stored = as_set(service.fetch_expenses_for_date(day).expect("fetch"));
        assert_eq!(stored, expected, "backend {}", name);
    }
}

#[test]
fn test_replace_is_idempotent() {
    for (name, service) in backends() {
        let day = date!(2024 - 08 - 03);
        let rows = vec![candidate(dec!(20), "Shopping", "shoes"), candidate(dec!(5), "Other", "")];

        service.replace_expenses_for_date(day, rows.clone()).expect("first replace");
        let once = as_set(service.fetch_expenses_for_date(day).expect("fetch"));

        let outcome = service.replace_expenses_for_date(day, rows).expect("second replace");
        let twice = as_set(service.fetch_expenses_for_date(day).expect("fetch"));

        assert_eq!(once, twice, "backend {}", name);
        assert_eq!(outcome.removed, 2, "backend {}", name);
        assert_eq!(outcome.inserted, 2, "backend {}", name);
    }
}

#[test]
fn test_replace_leaves_other_dates_untouched() {
    for (name, service) in backends() {
        let monday = date!(2024 - 08 - 05);
        let tuesday = date!(2024 - 08 - 06);
        service
            .replace_expenses_for_date(monday, vec![candidate(dec!(7), "Food", "")])
            .expect("replace monday");
        service
            .replace_expenses_for_date(tuesday, vec![candidate(dec!(9), "Food", "")])
            .expect("replace tuesday");
        service
            .replace_expenses_for_date(tuesday, vec![])
            .expect("clear tuesday");

        assert_eq!(service.fetch_expenses_for_date(monday).unwrap().len(), 1, "backend {}", name);
        assert!(service.fetch_expenses_for_date(tuesday).unwrap().is_empty(), "backend {}", name);
    }
}

#[test]
fn test_fetch_unknown_date_is_empty() {
    for (name, service) in backends() {
        let stored = service
            .fetch_expenses_for_date(date!(1999 - 12 - 31))
            .expect("fetch never fails for unknown dates");
        assert!(stored.is_empty(), "backend {}", name);
    }
}

#[test]
fn test_summary_breakdown() {
    for (name, service) in backends() {
        service
            .replace_expenses_for_date(date!(2024 - 08 - 01), vec![candidate(dec!(20), "Food", "")])
            .unwrap();
        service
            .replace_expenses_for_date(
                date!(2024 - 08 - 05),
                vec![candidate(dec!(30), "Food", ""), candidate(dec!(200), "Rent", "")],
            )
            .unwrap();
        // Outside the range
        service
            .replace_expenses_for_date(date!(2024 - 08 - 06), vec![candidate(dec!(999), "Shopping", "")])
            .unwrap();

        let summary = service
            .summarize(DateRange::new(date!(2024 - 08 - 01), date!(2024 - 08 - 05)))
            .expect("summary");

        assert_eq!(summary.grand_total, dec!(250), "backend {}", name);
        assert_eq!(summary.categories.len(), 2, "backend {}", name);
        assert_eq!(summary.categories["Food"].total, dec!(50), "backend {}", name);
        assert_eq!(summary.categories["Food"].percentage, 20.0, "backend {}", name);
        assert_eq!(summary.categories["Rent"].total, dec!(200), "backend {}", name);
        assert_eq!(summary.categories["Rent"].percentage, 80.0, "backend {}", name);
        assert!(!summary.categories.contains_key("Shopping"), "backend {}", name);

        let json = serde_json::to_value(&summary.categories).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Food": {"total": 50.0, "percentage": 20.0},
                "Rent": {"total": 200.0, "percentage": 80.0},
            }),
            "backend {}",
            name
        );
    }
}

#[test]
fn test_summary_percentages_sum_to_one_hundred() {
    for (name, service) in backends() {
        let rows = [
            ("Rent", dec!(1234.56)),
            ("Food", dec!(78.9)),
            ("Shopping", dec!(45.01)),
            ("Entertainment", dec!(33.33)),
            ("Other", dec!(0.07)),
        ];
        for (offset, (category, amount)) in rows.iter().enumerate() {
            let day = date!(2024 - 09 - 01) + time::Duration::days(offset as i64);
            service
                .replace_expenses_for_date(day, vec![candidate(*amount, category, "")])
                .unwrap();
        }

        let summary = service
            .summarize(DateRange::new(date!(2024 - 09 - 01), date!(2024 - 09 - 30)))
            .unwrap();
        let sum: f64 = summary.categories.values().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-6, "backend {}: percentages summed to {}", name, sum);
    }
}

#[test]
fn test_summary_of_empty_range() {
    for (name, service) in backends() {
        let summary = service
            .summarize(DateRange::new(date!(2030 - 01 - 01), date!(2030 - 12 - 31)))
            .expect("summary");
        assert!(summary.categories.is_empty(), "backend {}", name);
        assert!(summary.grand_total.is_zero(), "backend {}", name);

        service
            .replace_expenses_for_date(date!(2030 - 06 - 01), vec![candidate(dec!(5), "Food", "")])
            .unwrap();
        let reversed = service
            .summarize(DateRange::new(date!(2030 - 12 - 31), date!(2030 - 01 - 01)))
            .expect("reversed range is not an error");
        assert!(reversed.categories.is_empty(), "backend {}", name);
    }
}

/// Wraps the memory backend and fails the n-th insert of every transaction.
struct FlakyStorage {
    inner: InMemoryStorage,
    fail_on_insert: usize,
}

struct FlakyTransaction<'a> {
    inner: Box<dyn StorageTransaction + 'a>,
    inserts_left: usize,
}

impl StorageBackend for FlakyStorage {
    fn fetch_expenses(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        self.inner.fetch_expenses(date)
    }

    fn category_totals(&self, from: Date, to: Date) -> Result<Vec<CategoryTotal>, StorageError> {
        self.inner.category_totals(from, to)
    }

    fn begin_transaction(&self) -> Result<Box<dyn StorageTransaction + '_>, StorageError> {
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin_transaction()?,
            inserts_left: self.fail_on_insert,
        }))
    }
}

impl StorageTransaction for FlakyTransaction<'_> {
    fn id(&self) -> TransactionId {
        self.inner.id()
    }

    fn delete_expenses(&mut self, date: Date) -> Result<usize, StorageError> {
        self.inner.delete_expenses(date)
    }

    fn insert_expense(&mut self, record: &ExpenseRecord) -> Result<(), StorageError> {
        if self.inserts_left == 0 {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        self.inserts_left -= 1;
        self.inner.insert_expense(record)
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.rollback()
    }
}

#[test]
fn test_failed_replace_keeps_previous_records() {
    let storage = Arc::new(FlakyStorage {
        inner: InMemoryStorage::new(),
        fail_on_insert: 2,
    });
    let service = ExpenseService::new(storage);
    let day = date!(2024 - 08 - 01);

    service
        .replace_expenses_for_date(day, vec![candidate(dec!(10), "Food", "old")])
        .expect("two inserts fit under the failure threshold");
    let before = as_set(service.fetch_expenses_for_date(day).unwrap());

    let err = service
        .replace_expenses_for_date(
            day,
            vec![
                candidate(dec!(1), "Food", "new"),
                candidate(dec!(2), "Rent", "new"),
                candidate(dec!(3), "Other", "new"),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Storage(StorageError::Unavailable(_))));

    let after = as_set(service.fetch_expenses_for_date(day).unwrap());
    assert_eq!(before, after, "A failed replace must not leave a mixed day");
}
