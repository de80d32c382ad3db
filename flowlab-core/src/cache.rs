//! Cross-variant indicator memoization.
//!
//! Keyed by `(ticker, metric, window)`, valued by the full series. Shared by
//! every variant of a sweep, so a thousand variants gating on RSI(14) of SPY
//! compute that series exactly once.
//!
//! Concurrency: a `RwLock`-guarded map. Computation happens outside the
//! lock, so two threads racing on the same key may both compute; the first
//! insert wins and the loser's copy is dropped. Indicator functions are
//! pure, so the duplicate work is harmless and collisions are rare.
//!
//! Eviction is FIFO over whole series — a stored series is immutable and
//! never partially visible.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::indicators::{IndicatorError, MetricId};

/// Default capacity, sized for sweeps over a handful of tickers with a few
/// hundred distinct windows.
pub const DEFAULT_CACHE_CAPACITY: usize = 2000;

/// Cache key: one indicator series for one ticker.
pub type CacheKey = (String, MetricId, usize);

/// Counters exposed through [`IndicatorCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    map: HashMap<CacheKey, Arc<Vec<f64>>>,
    insertion_order: VecDeque<CacheKey>,
}

/// Bounded, concurrency-safe memo of indicator series.
pub struct IndicatorCache {
    inner: RwLock<CacheInner>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl IndicatorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                map: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a stored series without computing.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<f64>>> {
        let inner = self.inner.read().expect("indicator cache poisoned");
        inner.map.get(key).cloned()
    }

    /// Return the stored series for `key`, computing and storing it on a miss.
    ///
    /// The stored series is immutable (`Arc`-shared). On a racing double
    /// compute the first stored value is returned to every caller.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<Arc<Vec<f64>>, IndicatorError>
    where
        F: FnOnce() -> Result<Vec<f64>, IndicatorError>,
    {
        if let Some(series) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(series);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let computed = Arc::new(compute()?);

        let mut inner = self.inner.write().expect("indicator cache poisoned");
        if let Some(existing) = inner.map.get(&key) {
            return Ok(Arc::clone(existing));
        }
        while inner.map.len() >= self.capacity {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
        inner.map.insert(key.clone(), Arc::clone(&computed));
        inner.insertion_order.push_back(key);
        Ok(computed)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("indicator cache poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("indicator cache poisoned");
        inner.map.clear();
        inner.insertion_order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for IndicatorCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
