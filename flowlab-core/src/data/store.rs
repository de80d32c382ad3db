//! Read-only bar store: per-ticker daily OHLCV since a configured minimum
//! date.
//!
//! `ParquetBarStore` reads one `{SYMBOL}.parquet` file per ticker and keeps a
//! bounded LRU of immutable `Arc<Vec<Bar>>` views, so concurrent readers
//! share loaded series without copying. Missing tickers yield an empty
//! series; only I/O-level problems are errors.

use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::domain::{normalize_symbol, Bar};

/// Earliest bar date served by default.
pub fn default_min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1993, 1, 1).expect("static date")
}

/// Errors from the bar store. Missing tickers are NOT errors — they come
/// back as empty series so intersection logic can silently drop them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("parquet error for {symbol}: {message}")]
    Parquet { symbol: String, message: String },
}

/// Read-only access to per-ticker daily series, sorted ascending by date.
pub trait BarStore: Send + Sync {
    /// Full series for `symbol` from the store's minimum date onward.
    ///
    /// Unknown symbols yield `Ok` with an empty series.
    fn get(&self, symbol: &str) -> Result<Arc<Vec<Bar>>, StoreError>;
}

// ── Parquet-backed store ────────────────────────────────────────────

struct LruEntry {
    bars: Arc<Vec<Bar>>,
    last_used: u64,
}

struct LruState {
    entries: HashMap<String, LruEntry>,
    clock: u64,
}

/// Bar store over a directory of `{SYMBOL}.parquet` files.
pub struct ParquetBarStore {
    dir: PathBuf,
    min_date: NaiveDate,
    capacity: usize,
    lru: Mutex<LruState>,
}

impl ParquetBarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(dir, 256)
    }

    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            min_date: default_min_date(),
            capacity: capacity.max(1),
            lru: Mutex::new(LruState {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    pub fn with_min_date(mut self, min_date: NaiveDate) -> Self {
        self.min_date = min_date;
        self
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.parquet"))
    }

    fn load(&self, symbol: &str) -> Result<Arc<Vec<Bar>>, StoreError> {
        let path = self.symbol_path(symbol);
        if !path.exists() {
            return Ok(Arc::new(Vec::new()));
        }

        let mut bars = read_parquet_bars(&path, symbol)?;
        bars.retain(|b| b.date >= self.min_date);
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Ok(Arc::new(bars))
    }
}

impl BarStore for ParquetBarStore {
    fn get(&self, symbol: &str) -> Result<Arc<Vec<Bar>>, StoreError> {
        let symbol = normalize_symbol(symbol);

        {
            let mut lru = self.lru.lock().expect("bar store LRU poisoned");
            lru.clock += 1;
            let stamp = lru.clock;
            if let Some(entry) = lru.entries.get_mut(&symbol) {
                entry.last_used = stamp;
                return Ok(Arc::clone(&entry.bars));
            }
        }

        let bars = self.load(&symbol)?;

        let mut lru = self.lru.lock().expect("bar store LRU poisoned");
        lru.clock += 1;
        let stamp = lru.clock;
        while lru.entries.len() >= self.capacity {
            let oldest = lru
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    lru.entries.remove(&k);
                }
                None => break,
            }
        }
        lru.entries.insert(
            symbol,
            LruEntry {
                bars: Arc::clone(&bars),
                last_used: stamp,
            },
        );
        Ok(bars)
    }
}

/// Read bars from one parquet file.
///
/// Expects columns: date, open, high, low, close, volume, adj_close.
fn read_parquet_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet {
            symbol: symbol.to_string(),
            message: e.to_string(),
        })?;

    dataframe_to_bars(&df, symbol)
}

fn dataframe_to_bars(df: &DataFrame, symbol: &str) -> Result<Vec<Bar>, StoreError> {
    let col = |name: &str| {
        df.column(name).map_err(|e| StoreError::Parquet {
            symbol: symbol.to_string(),
            message: format!("column '{name}': {e}"),
        })
    };
    let f64_col = |name: &str| -> Result<Vec<f64>, StoreError> {
        Ok(col(name)?
            .f64()
            .map_err(|e| StoreError::Parquet {
                symbol: symbol.to_string(),
                message: format!("column '{name}' type: {e}"),
            })?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    };

    let dates = col("date")?;
    let date_ca = dates.date().map_err(|e| StoreError::Parquet {
        symbol: symbol.to_string(),
        message: format!("date column type: {e}"),
    })?;

    let opens = f64_col("open")?;
    let highs = f64_col("high")?;
    let lows = f64_col("low")?;
    let closes = f64_col("close")?;
    let adj_closes = f64_col("adj_close")?;
    let volumes: Vec<u64> = col("volume")?
        .u64()
        .map_err(|e| StoreError::Parquet {
            symbol: symbol.to_string(),
            message: format!("column 'volume' type: {e}"),
        })?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("static date");
    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let Some(days) = date_ca.get(i) else {
            continue;
        };
        bars.push(Bar {
            date: epoch + chrono::Duration::days(days as i64),
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
            adj_close: adj_closes[i],
        });
    }
    Ok(bars)
}

// ── In-memory store ─────────────────────────────────────────────────

/// In-memory bar store for tests and synthetic backtests.
#[derive(Default)]
pub struct MemoryBarStore {
    series: HashMap<String, Arc<Vec<Bar>>>,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, bars: Vec<Bar>) {
        self.series
            .insert(normalize_symbol(symbol), Arc::new(bars));
    }

    pub fn with(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.insert(symbol, bars);
        self
    }
}

impl BarStore for MemoryBarStore {
    fn get(&self, symbol: &str) -> Result<Arc<Vec<Bar>>, StoreError> {
        Ok(self
            .series
            .get(&normalize_symbol(symbol))
            .cloned()
            .unwrap_or_else(|| Arc::new(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::bars_from_closes;

    fn write_parquet_fixture(dir: &Path, symbol: &str, bars: &[Bar]) {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let dates: Vec<i32> = bars
            .iter()
            .map(|b| (b.date - epoch).num_days() as i32)
            .collect();
        let df = DataFrame::new(vec![
            Column::new("date".into(), dates)
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("open".into(), bars.iter().map(|b| b.open).collect::<Vec<_>>()),
            Column::new("high".into(), bars.iter().map(|b| b.high).collect::<Vec<_>>()),
            Column::new("low".into(), bars.iter().map(|b| b.low).collect::<Vec<_>>()),
            Column::new(
                "close".into(),
                bars.iter().map(|b| b.close).collect::<Vec<_>>(),
            ),
            Column::new(
                "volume".into(),
                bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
            ),
            Column::new(
                "adj_close".into(),
                bars.iter().map(|b| b.adj_close).collect::<Vec<_>>(),
            ),
        ])
        .unwrap();
        let file = fs::File::create(dir.join(format!("{symbol}.parquet"))).unwrap();
        ParquetWriter::new(file).finish(&mut df.clone()).unwrap();
    }

    #[test]
    fn parquet_roundtrip_sorted_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bars = bars_from_closes("SPY", start, &[100.0, 101.0, 102.0]);
        write_parquet_fixture(dir.path(), "SPY", &bars);

        let store = ParquetBarStore::new(dir.path());
        let loaded = store.get("SPY").unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(loaded[0].close, 100.0);
    }

    #[test]
    fn missing_ticker_yields_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetBarStore::new(dir.path());
        let series = store.get("NOPE").unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn min_date_filters_old_bars() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(1990, 1, 2).unwrap();
        let bars = bars_from_closes("SPY", start, &[50.0; 10]);
        write_parquet_fixture(dir.path(), "SPY", &bars);

        let store = ParquetBarStore::new(dir.path());
        let loaded = store.get("SPY").unwrap();
        // All bars predate 1993-01-01.
        assert!(loaded.is_empty());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        for sym in ["A", "B", "C"] {
            write_parquet_fixture(dir.path(), sym, &bars_from_closes(sym, start, &[1.0, 2.0, 3.0]));
        }

        let store = ParquetBarStore::with_capacity(dir.path(), 2);
        store.get("A").unwrap();
        store.get("B").unwrap();
        store.get("A").unwrap(); // refresh A
        store.get("C").unwrap(); // evicts B

        let lru = store.lru.lock().unwrap();
        assert!(lru.entries.contains_key("A"));
        assert!(!lru.entries.contains_key("B"));
        assert!(lru.entries.contains_key("C"));
    }

    #[test]
    fn memory_store_normalizes_symbols() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let store = MemoryBarStore::new().with("spy", bars_from_closes("SPY", start, &[1.0]));
        assert_eq!(store.get(" SPY ").unwrap().len(), 1);
    }
}
