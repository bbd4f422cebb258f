//! expensedb: a personal expense tracker.
//!
//! Expenses are stored per calendar date and replaced a whole day at a time;
//! summaries break a date range down by category with each category's share
//! of the total. The HTTP API in [`http`] is the only outer surface.

pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod service;
pub mod storage;
pub mod telemetry;
