//! Target portfolio allocation: ticker → weight.
//!
//! Backed by a `BTreeMap` so iteration is always in sorted ticker order.
//! Floating-point addition is not associative; pinning the merge order pins
//! the bits, which keeps sweep results reproducible across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance when checking that a blended allocation's weights sum to 0 or 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// A finite mapping from ticker to non-negative weight.
///
/// The sum is 0 (fully out of market) or 1 (fully invested); intermediate
/// sums can arise from scaling blends whose branches differ in coverage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation(BTreeMap<String, f64>);

impl Allocation {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Fully-invested single-ticker allocation.
    pub fn single(ticker: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(ticker.into(), 1.0);
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn weight(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    /// Accumulate `weight` onto `ticker` (duplicate tickers add up).
    pub fn add(&mut self, ticker: &str, weight: f64) {
        *self.0.entry(ticker.to_string()).or_insert(0.0) += weight;
    }

    /// Iterate `(ticker, weight)` in sorted ticker order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(t, &w)| (t.as_str(), w))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

impl FromIterator<(String, f64)> for Allocation {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
