//! Trend family: rolling linear regression, price-vs-SMA, trend clarity,
//! cumulative return, SMA of returns.

use super::{mean, pct_change, rolling_apply};

/// Ordinary least squares fit over x = 0..len-1; returns (slope, intercept).
fn ols(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (j, &y) in values.iter().enumerate() {
        let dx = j as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };
    (slope, y_mean - slope * x_mean)
}

/// Rolling linear regression slope (price units per bar).
pub fn linreg_slope(close: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; close.len()];
    }
    rolling_apply(close, window, |slice| ols(slice).0)
}

/// Rolling linear regression value: the fit evaluated at the window's end.
pub fn linreg_value(close: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; close.len()];
    }
    rolling_apply(close, window, |slice| {
        let (slope, intercept) = ols(slice);
        intercept + slope * (slice.len() - 1) as f64
    })
}

/// Close divided by its SMA; > 1 above trend, < 1 below.
pub fn price_vs_sma(close: &[f64], window: usize) -> Vec<f64> {
    let sma = rolling_apply(close, window, mean);
    close
        .iter()
        .zip(&sma)
        .map(|(&c, &m)| {
            if c.is_finite() && m.is_finite() && m != 0.0 {
                c / m
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Trend clarity: R² of the rolling linear fit, in [0, 1].
///
/// NaN on a perfectly flat window (zero total variance).
pub fn trend_clarity(close: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; close.len()];
    }
    rolling_apply(close, window, |slice| {
        let (slope, intercept) = ols(slice);
        let y_mean = mean(slice);
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (j, &y) in slice.iter().enumerate() {
            let fitted = intercept + slope * j as f64;
            ss_res += (y - fitted).powi(2);
            ss_tot += (y - y_mean).powi(2);
        }
        if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            f64::NAN
        }
    })
}

/// Total return over `window` bars, as a percentage.
pub fn cumulative_return(close: &[f64], window: usize) -> Vec<f64> {
    pct_change(close, window).iter().map(|r| r * 100.0).collect()
}

/// SMA of daily returns over `window` bars, as a percentage.
pub fn sma_of_returns(close: &[f64], window: usize) -> Vec<f64> {
    let returns = pct_change(close, 1);
    rolling_apply(&returns, window, |slice| mean(slice) * 100.0)
}
