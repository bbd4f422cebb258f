use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use crate::error::ValidationError;

use super::{parse_date, Category, DateRange, ExpenseRecord};

/// A client-submitted expense row, not yet validated or filtered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CandidateExpense {
    /// Accepts a JSON number or a decimal string.
    pub amount: Decimal,
    pub category: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CandidateExpense {
    pub fn new(amount: Decimal, category: &str, notes: Option<&str>) -> Self {
        Self {
            amount,
            category: category.to_string(),
            notes: notes.map(str::to_string),
        }
    }

    /// Checks the row's constraints; `index` is its position in the request.
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.amount < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount {
                index,
                amount: self.amount,
            });
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::EmptyCategory { index });
        }
        Ok(())
    }

    pub fn into_record(self, date: Date) -> ExpenseRecord {
        ExpenseRecord::new(date, self.amount, Category::parse(&self.category), self.notes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummaryRequest {
    pub start_date: String,
    pub end_date: String,
}

impl SummaryRequest {
    pub fn validate(&self) -> Result<DateRange, ValidationError> {
        Ok(DateRange::new(
            parse_date("start_date", &self.start_date)?,
            parse_date("end_date", &self.end_date)?,
        ))
    }
}
