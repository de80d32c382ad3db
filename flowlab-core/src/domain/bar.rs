//! Daily OHLCV bar and symbol normalization.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One day's OHLCV record for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

/// Normalize a ticker symbol: trim whitespace, uppercase.
///
/// Symbol equality everywhere else is exact, so normalization happens once
/// at the boundaries (tree loading, store lookups).
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
