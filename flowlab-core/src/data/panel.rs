//! Aligned price panel: N tickers × T days on a common date axis.
//!
//! Alignment intersects dates over the indicator tickers (every condition
//! must be evaluable at every bar), reindexes all six fields onto that axis,
//! forward- then backward-fills gaps, and trims leading rows until every
//! ticker has a finite close. Panels are immutable after construction and
//! shared read-only across sweep variants.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{normalize_symbol, Bar};
use crate::indicators::SeriesView;

use super::store::{BarStore, StoreError};

/// Minimum aligned length for a usable panel.
pub const MIN_PANEL_BARS: usize = 3;

/// Errors from panel construction.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("insufficient data: {bars} aligned bars, need at least {MIN_PANEL_BARS}")]
    InsufficientData { bars: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Six dense arrays for one ticker, all the same length as the panel's dates.
#[derive(Debug, Clone)]
pub struct TickerColumns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub adj_close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl TickerColumns {
    fn with_len(len: usize) -> Self {
        Self {
            open: vec![f64::NAN; len],
            high: vec![f64::NAN; len],
            low: vec![f64::NAN; len],
            close: vec![f64::NAN; len],
            adj_close: vec![f64::NAN; len],
            volume: vec![f64::NAN; len],
        }
    }

    fn fields_mut(&mut self) -> [&mut Vec<f64>; 6] {
        [
            &mut self.open,
            &mut self.high,
            &mut self.low,
            &mut self.close,
            &mut self.adj_close,
            &mut self.volume,
        ]
    }

    fn trim_front(&mut self, k: usize) {
        for field in self.fields_mut() {
            field.drain(..k);
        }
    }
}

/// The aligned panel.
#[derive(Debug, Clone)]
pub struct PricePanel {
    pub dates: Vec<NaiveDate>,
    columns: HashMap<String, TickerColumns>,
}

impl PricePanel {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.columns.contains_key(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn columns(&self, ticker: &str) -> Option<&TickerColumns> {
        self.columns.get(ticker)
    }

    pub fn close(&self, ticker: &str) -> Option<&[f64]> {
        self.columns.get(ticker).map(|c| c.close.as_slice())
    }

    /// Borrow one ticker's arrays as an indicator input.
    pub fn series(&self, ticker: &str) -> Option<SeriesView<'_>> {
        self.columns.get(ticker).map(|c| SeriesView {
            open: &c.open,
            high: &c.high,
            low: &c.low,
            close: &c.close,
            adj_close: &c.adj_close,
            volume: &c.volume,
        })
    }

    /// Dates as unix seconds (midnight UTC), the equity-curve timestamp
    /// convention.
    pub fn unix_seconds(&self) -> Vec<i64> {
        self.dates
            .iter()
            .map(|d| {
                d.and_hms_opt(0, 0, 0)
                    .expect("midnight always exists")
                    .and_utc()
                    .timestamp()
            })
            .collect()
    }
}

/// Forward-fill NaN gaps in place from the last finite value.
pub fn forward_fill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = *v;
        } else if last.is_finite() {
            *v = last;
        }
    }
}

/// Backward-fill leading NaNs in place from the next finite value.
pub fn backward_fill(values: &mut [f64]) {
    let mut next = f64::NAN;
    for v in values.iter_mut().rev() {
        if v.is_finite() {
            next = *v;
        } else if next.is_finite() {
            *v = next;
        }
    }
}

/// Build an aligned panel for `price_tickers` ∪ `indicator_tickers`.
///
/// The date axis is the intersection over indicator tickers that loaded
/// (falling back to all loaded tickers when none did). Tickers with empty
/// series are silently dropped — `UnknownTicker` is the caller's concern,
/// not the builder's.
pub fn build_panel(
    store: &dyn BarStore,
    price_tickers: &[String],
    indicator_tickers: &[String],
) -> Result<Arc<PricePanel>, PanelError> {
    // Load every ticker once, normalized and deduplicated.
    let mut requested: Vec<String> = price_tickers
        .iter()
        .chain(indicator_tickers)
        .map(|t| normalize_symbol(t))
        .collect();
    requested.sort();
    requested.dedup();

    let mut loaded: HashMap<String, Arc<Vec<Bar>>> = HashMap::new();
    for ticker in &requested {
        let series = store.get(ticker)?;
        if !series.is_empty() {
            loaded.insert(ticker.clone(), series);
        }
    }
    if loaded.is_empty() {
        return Err(PanelError::InsufficientData { bars: 0 });
    }

    // Date intersection over the indicator tickers that actually loaded.
    let normalized_indicator: BTreeSet<String> = indicator_tickers
        .iter()
        .map(|t| normalize_symbol(t))
        .collect();
    let mut intersection_over: Vec<&str> = loaded
        .keys()
        .filter(|k| normalized_indicator.contains(*k))
        .map(|k| k.as_str())
        .collect();
    if intersection_over.is_empty() {
        intersection_over = loaded.keys().map(|k| k.as_str()).collect();
    }

    let mut common: Option<BTreeSet<NaiveDate>> = None;
    for ticker in &intersection_over {
        let dates: BTreeSet<NaiveDate> = loaded[*ticker].iter().map(|b| b.date).collect();
        common = Some(match common {
            None => dates,
            Some(prev) => prev.intersection(&dates).copied().collect(),
        });
    }
    let dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();
    if dates.len() < MIN_PANEL_BARS {
        return Err(PanelError::InsufficientData { bars: dates.len() });
    }

    // Reindex each ticker onto the common axis, then fill.
    let index: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut columns: HashMap<String, TickerColumns> = HashMap::new();
    for (ticker, bars) in &loaded {
        let mut cols = TickerColumns::with_len(dates.len());
        for bar in bars.iter() {
            if let Some(&i) = index.get(&bar.date) {
                cols.open[i] = bar.open;
                cols.high[i] = bar.high;
                cols.low[i] = bar.low;
                cols.close[i] = bar.close;
                cols.adj_close[i] = bar.adj_close;
                cols.volume[i] = bar.volume as f64;
            }
        }
        for field in cols.fields_mut() {
            forward_fill(field);
            backward_fill(field);
        }
        columns.insert(ticker.clone(), cols);
    }

    // Trim leading rows until every ticker has a finite close.
    let first_valid = (0..dates.len())
        .find(|&i| columns.values().all(|c| c.close[i].is_finite()));
    let Some(k) = first_valid else {
        return Err(PanelError::InsufficientData { bars: 0 });
    };
    let remaining = dates.len() - k;
    if remaining < MIN_PANEL_BARS {
        return Err(PanelError::InsufficientData { bars: remaining });
    }

    let dates = dates[k..].to_vec();
    if k > 0 {
        for cols in columns.values_mut() {
            cols.trim_front(k);
        }
    }

    Ok(Arc::new(PricePanel { dates, columns }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::MemoryBarStore;
    use crate::synthetic::bars_from_closes;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn strings(tickers: &[&str]) -> Vec<String> {
        tickers.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn aligns_on_intersection_of_indicator_tickers() {
        let start = day(2024, 1, 2);
        let store = MemoryBarStore::new()
            .with("SPY", bars_from_closes("SPY", start, &[100.0, 101.0, 102.0, 103.0, 104.0]))
            // QQQ starts one trading day later.
            .with(
                "QQQ",
                bars_from_closes("QQQ", day(2024, 1, 3), &[200.0, 202.0, 204.0, 206.0]),
            );

        let panel = build_panel(&store, &strings(&["SPY", "QQQ"]), &strings(&["SPY", "QQQ"]))
            .unwrap();
        // Intersection drops SPY's first day.
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.close("SPY").unwrap()[0], 101.0);
        assert_eq!(panel.close("QQQ").unwrap()[0], 200.0);
    }

    #[test]
    fn unknown_tickers_silently_dropped() {
        let start = day(2024, 1, 2);
        let store = MemoryBarStore::new().with(
            "SPY",
            bars_from_closes("SPY", start, &[100.0, 101.0, 102.0, 103.0]),
        );

        let panel =
            build_panel(&store, &strings(&["SPY", "GHOST"]), &strings(&["SPY"])).unwrap();
        assert!(panel.contains("SPY"));
        assert!(!panel.contains("GHOST"));
    }

    #[test]
    fn too_few_overlapping_bars_is_an_error() {
        let start = day(2024, 1, 2);
        let store = MemoryBarStore::new()
            .with("SPY", bars_from_closes("SPY", start, &[100.0, 101.0]))
            .with("QQQ", bars_from_closes("QQQ", start, &[200.0, 202.0]));

        let err = build_panel(&store, &strings(&["SPY", "QQQ"]), &strings(&["SPY", "QQQ"]))
            .unwrap_err();
        assert!(matches!(err, PanelError::InsufficientData { bars: 2 }));
    }

    #[test]
    fn empty_store_is_an_error() {
        let store = MemoryBarStore::new();
        let err = build_panel(&store, &strings(&["SPY"]), &strings(&["SPY"])).unwrap_err();
        assert!(matches!(err, PanelError::InsufficientData { bars: 0 }));
    }

    #[test]
    fn non_indicator_ticker_gap_is_filled_not_intersected() {
        let start = day(2024, 1, 2);
        // BIL is only a position ticker; its missing middle day must be
        // forward-filled rather than shrinking the axis.
        let mut bil = bars_from_closes("BIL", start, &[91.0, 92.0, 93.0, 94.0, 95.0]);
        bil.remove(2);
        let store = MemoryBarStore::new()
            .with("SPY", bars_from_closes("SPY", start, &[100.0, 101.0, 102.0, 103.0, 104.0]))
            .with("BIL", bil);

        let panel =
            build_panel(&store, &strings(&["SPY", "BIL"]), &strings(&["SPY"])).unwrap();
        assert_eq!(panel.len(), 5);
        // Gap filled with the previous close.
        assert_eq!(panel.close("BIL").unwrap()[2], 92.0);
    }

    #[test]
    fn leading_gap_backfilled_then_no_nan_close() {
        let start = day(2024, 1, 2);
        // QQQ misses the first two panel days entirely.
        let qqq = bars_from_closes("QQQ", day(2024, 1, 4), &[200.0, 202.0, 204.0]);
        let store = MemoryBarStore::new()
            .with("SPY", bars_from_closes("SPY", start, &[100.0, 101.0, 102.0, 103.0, 104.0]))
            .with("QQQ", qqq);

        let panel =
            build_panel(&store, &strings(&["SPY", "QQQ"]), &strings(&["SPY"])).unwrap();
        for ticker in ["SPY", "QQQ"] {
            assert!(
                panel.close(ticker).unwrap().iter().all(|v| v.is_finite()),
                "NaN close survived for {ticker}"
            );
        }
    }

    #[test]
    fn fill_roundtrip_is_noop_on_clean_data() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0];
        let original = values.clone();
        forward_fill(&mut values);
        backward_fill(&mut values);
        assert_eq!(values, original);
    }

    #[test]
    fn forward_then_backward_fill_order() {
        let mut values = vec![f64::NAN, 2.0, f64::NAN, 4.0, f64::NAN];
        forward_fill(&mut values);
        backward_fill(&mut values);
        // Interior/trailing gaps take the prior value; leading takes the next.
        assert_eq!(values, vec![2.0, 2.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn unix_seconds_are_midnight_utc() {
        let start = day(2024, 1, 2);
        let store = MemoryBarStore::new().with(
            "SPY",
            bars_from_closes("SPY", start, &[100.0, 101.0, 102.0]),
        );
        let panel = build_panel(&store, &strings(&["SPY"]), &strings(&["SPY"])).unwrap();
        let ts = panel.unix_seconds();
        assert_eq!(ts.len(), 3);
        assert_eq!(ts[0] % 86_400, 0);
        assert!(ts.windows(2).all(|w| w[1] > w[0]));
    }
}
