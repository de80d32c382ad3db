//! Volatility family: rolling deviations, ATR, Bollinger, Ulcer, drawdowns.
//!
//! Units are pinned per name: `Standard Deviation` and `Historical
//! Volatility` are annualized percentages, `Drawdown` and `Max Drawdown` are
//! negative percentages measured from the rolling peak.

use super::{mean, pct_change, recursive_smooth, rolling_apply, rolling_max_mp1, sample_std};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Rolling standard deviation of daily returns, annualized, in percent.
pub fn stddev_returns(close: &[f64], window: usize) -> Vec<f64> {
    let returns = pct_change(close, 1);
    rolling_apply(&returns, window, |slice| {
        sample_std(slice) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
    })
}

/// Rolling standard deviation of the price itself.
pub fn stddev_price(close: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(close, window, sample_std)
}

/// Average True Range: Wilder-smoothed true range.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let tr = super::true_range(high, low, close);
    recursive_smooth(&tr, window, 1.0 / window as f64)
}

/// ATR as a percentage of the close (NATR).
pub fn atr_percent(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    atr(high, low, close, window)
        .iter()
        .zip(close)
        .map(|(&a, &c)| {
            if a.is_finite() && c.is_finite() && c != 0.0 {
                a / c * 100.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

fn bollinger_bands(close: &[f64], window: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = rolling_apply(close, window, mean);
    let std = rolling_apply(close, window, sample_std);
    let lower: Vec<f64> = middle.iter().zip(&std).map(|(&m, &s)| m - 2.0 * s).collect();
    let upper: Vec<f64> = middle.iter().zip(&std).map(|(&m, &s)| m + 2.0 * s).collect();
    (lower, middle, upper)
}

/// Bollinger %B: position of close within the ±2σ bands (0 at lower, 1 at upper).
pub fn bollinger_percent_b(close: &[f64], window: usize) -> Vec<f64> {
    let (lower, _, upper) = bollinger_bands(close, window);
    close
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let lo = lower[i];
            let hi = upper[i];
            if c.is_finite() && lo.is_finite() && hi > lo {
                (c - lo) / (hi - lo)
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Bollinger bandwidth: (upper − lower)/middle × 100.
pub fn bollinger_bandwidth(close: &[f64], window: usize) -> Vec<f64> {
    let (lower, middle, upper) = bollinger_bands(close, window);
    (0..close.len())
        .map(|i| {
            if middle[i].is_finite() && middle[i] != 0.0 && lower[i].is_finite() {
                (upper[i] - lower[i]) / middle[i] * 100.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Percent distance from the rolling peak (min_periods = 1), always ≤ 0.
pub fn drawdown(close: &[f64], window: usize) -> Vec<f64> {
    let peaks = rolling_max_mp1(close, window);
    close
        .iter()
        .zip(&peaks)
        .map(|(&c, &p)| {
            if c.is_finite() && p.is_finite() && p != 0.0 {
                (c - p) / p * 100.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Deepest drawdown within the window: rolling minimum of `drawdown`.
pub fn max_drawdown(close: &[f64], window: usize) -> Vec<f64> {
    let dd = drawdown(close, window);
    rolling_apply(&dd, window, |slice| {
        slice.iter().copied().fold(f64::INFINITY, f64::min)
    })
}

/// Ulcer Index: √(rolling mean of squared percent drawdowns).
pub fn ulcer_index(close: &[f64], window: usize) -> Vec<f64> {
    let dd = drawdown(close, window);
    rolling_apply(&dd, window, |slice| {
        (slice.iter().map(|d| d * d).sum::<f64>() / slice.len() as f64).sqrt()
    })
}

/// Annualized volatility of log returns, in percent.
pub fn historical_volatility(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut log_returns = vec![f64::NAN; n];
    for i in 1..n {
        if close[i].is_finite() && close[i - 1].is_finite() && close[i - 1] > 0.0 && close[i] > 0.0
        {
            log_returns[i] = (close[i] / close[i - 1]).ln();
        }
    }
    rolling_apply(&log_returns, window, |slice| {
        sample_std(slice) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
    })
}
