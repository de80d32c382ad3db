//! Synthetic bar generation for tests and benchmarks.
//!
//! Deterministic by construction: ramps come from explicit close lists and
//! random walks from a fixed seed, so fixtures are reproducible across runs.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Bar;

/// The next weekday on or after `date`.
fn next_trading_day(mut date: NaiveDate) -> NaiveDate {
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date = date.succ_opt().expect("date overflow");
    }
    date
}

/// `n` consecutive weekdays starting on or after `start`.
pub fn trading_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut current = next_trading_day(start);
    for _ in 0..n {
        days.push(current);
        current = next_trading_day(current.succ_opt().expect("date overflow"));
    }
    days
}

/// Bars from explicit closes on consecutive weekdays.
///
/// Open is the prior close, high/low pad the open/close range by 0.5%,
/// volume is flat.
pub fn bars_from_closes(_symbol: &str, start: NaiveDate, closes: &[f64]) -> Vec<Bar> {
    let dates = trading_days(start, closes.len());
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let pad = close.abs() * 0.005;
            Bar {
                date: dates[i],
                open,
                high: open.max(close) + pad,
                low: open.min(close) - pad,
                close,
                volume: 1_000_000,
                adj_close: close,
            }
        })
        .collect()
}

/// Seeded geometric random walk: ~0.03% drift, 1% daily noise.
pub fn random_walk_bars(symbol: &str, start: NaiveDate, n: usize, seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = 100.0;
    let mut closes = Vec::with_capacity(n);
    for _ in 0..n {
        let step: f64 = rng.gen_range(-0.01..0.01);
        close *= 1.0003 + step;
        closes.push(close);
    }
    bars_from_closes(symbol, start, &closes)
}
