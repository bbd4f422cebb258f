use std::{collections::BTreeMap, sync::Arc};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use time::Date;

use crate::{
    error::{ServiceError, StorageError, ValidationError},
    models::{
        read::{CategoryBreakdown, ExpenseSummary, ReplaceOutcome},
        write::CandidateExpense,
        CategoryTotal, DateRange, ExpenseRecord,
    },
    storage::{StorageBackend, StorageTransaction},
    telemetry,
};

/// Replace-by-date and range summaries over an injected storage backend.
///
/// Every call opens and releases its own storage access; the service keeps
/// no state between calls.
pub struct ExpenseService {
    storage: Arc<dyn StorageBackend>,
}

impl ExpenseService {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// All records stored for `date`. An unknown date yields an empty list.
    pub fn fetch_expenses_for_date(&self, date: Date) -> Result<Vec<ExpenseRecord>, ServiceError> {
        tracing::debug!(date = %date, "fetch_expenses_for_date");
        self.storage
            .fetch_expenses(date)
            .map_err(|e| storage_failure("fetch", e))
    }

    /// Replaces every record of `date` with the non-zero rows of `candidates`.
    ///
    /// The whole list is validated before storage is touched. Delete and
    /// inserts share one transaction, so on failure the date keeps its
    /// previous records.
    pub fn replace_expenses_for_date(
        &self,
        date: Date,
        candidates: Vec<CandidateExpense>,
    ) -> Result<ReplaceOutcome, ServiceError> {
        let (records, skipped) = prepare_records(date, candidates)?;
        tracing::debug!(date = %date, rows = records.len(), skipped, "replace_expenses_for_date");

        let mut tx = self
            .storage
            .begin_transaction()
            .map_err(|e| storage_failure("replace", e))?;
        let tx_id = tx.id();

        let removed = match write_day(tx.as_mut(), date, &records) {
            Ok(removed) => removed,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(tx_id, error = %rollback_err, "Rollback failed");
                } else {
                    tracing::warn!(tx_id, date = %date, "Replace rolled back");
                }
                return Err(storage_failure("replace", e));
            }
        };
        tx.commit().map_err(|e| storage_failure("replace", e))?;

        let outcome = ReplaceOutcome {
            date,
            removed,
            inserted: records.len(),
            skipped,
        };
        metrics::increment_counter!("expensedb_replacements_total");
        metrics::counter!("expensedb_records_written_total", outcome.inserted as u64);
        metrics::counter!("expensedb_empty_rows_skipped_total", outcome.skipped as u64);
        tracing::info!(
            tx_id,
            date = %date,
            removed = outcome.removed,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            "Expenses replaced"
        );
        Ok(outcome)
    }

    /// Per-category totals and percentages over the closed `range`.
    pub fn summarize(&self, range: DateRange) -> Result<ExpenseSummary, ServiceError> {
        tracing::debug!(start = %range.start, end = %range.end, "summarize");
        metrics::increment_counter!("expensedb_summaries_total");

        if range.is_empty() {
            return Ok(ExpenseSummary::empty(range.start, range.end));
        }

        let totals = self
            .storage
            .category_totals(range.start, range.end)
            .map_err(|e| storage_failure("summary", e))?;
        let (grand_total, categories) =
            breakdown(totals).map_err(|e| storage_failure("summary", e))?;

        tracing::info!(
            start = %range.start,
            end = %range.end,
            categories = categories.len(),
            grand_total = %grand_total,
            "Summary computed"
        );
        Ok(ExpenseSummary {
            start_date: range.start,
            end_date: range.end,
            grand_total,
            categories,
        })
    }
}

fn storage_failure(operation: &'static str, e: StorageError) -> ServiceError {
    telemetry::record_storage_error(operation);
    tracing::error!(operation, error = %e, "Storage operation failed");
    ServiceError::Storage(e)
}

/// Validates every candidate, then drops the zero-amount ones. Returns the
/// records to write and the number of rows dropped.
fn prepare_records(
    date: Date,
    candidates: Vec<CandidateExpense>,
) -> Result<(Vec<ExpenseRecord>, usize), ValidationError> {
    for (index, candidate) in candidates.iter().enumerate() {
        candidate.validate(index)?;
    }

    let total = candidates.len();
    let records: Vec<ExpenseRecord> = candidates
        .into_iter()
        .map(|candidate| candidate.into_record(date))
        .filter(|record| !record.is_empty())
        .collect();
    let skipped = total - records.len();
    Ok((records, skipped))
}

fn write_day(
    tx: &mut (dyn StorageTransaction + '_),
    date: Date,
    records: &[ExpenseRecord],
) -> Result<usize, StorageError> {
    let removed = tx.delete_expenses(date)?;
    for record in records {
        tx.insert_expense(record)?;
    }
    Ok(removed)
}

/// Folds category totals into the summary mapping. Totals reported twice for
/// the same category are merged. With a zero grand total every percentage
/// is zero.
pub fn breakdown(
    totals: Vec<CategoryTotal>,
) -> Result<(Decimal, BTreeMap<String, CategoryBreakdown>), StorageError> {
    let mut merged: BTreeMap<String, Decimal> = BTreeMap::new();
    for row in totals {
        let sum = merged.entry(row.category.to_string()).or_insert(Decimal::ZERO);
        *sum = sum
            .checked_add(row.total)
            .ok_or_else(|| StorageError::overflow(format!("category {}", row.category)))?;
    }

    let grand_total = merged.values().try_fold(Decimal::ZERO, |acc, total| {
        acc.checked_add(*total)
            .ok_or_else(|| StorageError::overflow("grand total"))
    })?;
    let categories = merged
        .into_iter()
        .map(|(category, total)| {
            let percentage = total
                .checked_div(grand_total)
                .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
                .and_then(|p| p.to_f64())
                .unwrap_or(0.0);
            (category, CategoryBreakdown { total, percentage })
        })
        .collect();

    Ok((grand_total, categories))
}
