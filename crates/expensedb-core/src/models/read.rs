use rust_decimal::Decimal;
use serde::Serialize;

use super::Category;

/// Sum of the amounts of one category inside a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl CategoryTotal {
    pub fn new(category: Category, total: Decimal) -> Self {
        Self { category, total }
    }
}
