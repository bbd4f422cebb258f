use std::{fmt::Display, sync::Arc};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

pub mod read;

/// Expense category. The five named variants are the categories offered by
/// the entry form; anything else is kept verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Rent,
    Food,
    Shopping,
    Entertainment,
    Other,
    Custom(Arc<str>),
}

impl Category {
    /// Parses a category name. Known names match case-insensitively and
    /// surrounding whitespace is ignored.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "rent" => Category::Rent,
            "food" => Category::Food,
            "shopping" => Category::Shopping,
            "entertainment" => Category::Entertainment,
            "other" => Category::Other,
            _ => Category::Custom(Arc::from(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Rent => "Rent",
            Category::Food => "Food",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
            Category::Other => "Other",
            Category::Custom(name) => name,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::parse(&value)
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::parse(value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

/// A single stored expense. Records have no identity of their own: every
/// record sharing a date belongs to one replaceable group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub date: Date,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: Category,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExpenseRecord {
    pub fn new(date: Date, amount: Decimal, category: Category, notes: Option<String>) -> Self {
        Self {
            date,
            amount,
            category,
            notes,
        }
    }

    /// Zero-amount rows are the entry form's blank rows and are never stored.
    pub fn is_empty(&self) -> bool {
        self.amount.is_zero()
    }
}
