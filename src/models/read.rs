use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

/// One entry of a summary: a category's total and its share of the grand
/// total, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseSummary {
    pub start_date: Date,
    pub end_date: Date,
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
    pub categories: BTreeMap<String, CategoryBreakdown>,
}

impl ExpenseSummary {
    pub fn empty(start_date: Date, end_date: Date) -> Self {
        Self {
            start_date,
            end_date,
            grand_total: Decimal::ZERO,
            categories: BTreeMap::new(),
        }
    }
}

/// What a replace-for-date call did to the stored day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub date: Date,
    /// Records that existed for the date before the call.
    pub removed: usize,
    pub inserted: usize,
    /// Zero-amount rows dropped before writing.
    pub skipped: usize,
}
