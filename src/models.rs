use serde::Serialize;
use time::{macros::format_description, Date};

use crate::error::ValidationError;

pub mod read;
pub mod write;

pub use expensedb_core::{Category, CategoryTotal, ExpenseRecord};

/// Parses a `YYYY-MM-DD` calendar date, naming `field` in the error.
pub fn parse_date(field: &'static str, value: &str) -> Result<Date, ValidationError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::MalformedDate {
            field,
            value: value.to_string(),
        }
    })
}

/// Closed date interval. A range whose start is after its end is valid and
/// simply contains no dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}
