//! Moving average family: SMA, EMA, WMA, HMA, DEMA, TEMA, KAMA, Wilder MA.
//!
//! All EMA-style averages are seeded with the SMA over the first full window
//! of finite values, so warm-up is `window - 1` bars past the first finite
//! input.

use super::{mean, recursive_smooth, rolling_apply};

/// Simple moving average.
pub fn sma(close: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(close, window, mean)
}

/// Exponential moving average, α = 2/(w+1), SMA-seeded.
pub fn ema(close: &[f64], window: usize) -> Vec<f64> {
    recursive_smooth(close, window, 2.0 / (window as f64 + 1.0))
}

/// Wilder moving average (RMA), α = 1/w, SMA-seeded.
pub fn wilder_ma(close: &[f64], window: usize) -> Vec<f64> {
    recursive_smooth(close, window, 1.0 / window as f64)
}

/// Linearly weighted moving average: weights 1..=w, newest heaviest.
pub fn wma(close: &[f64], window: usize) -> Vec<f64> {
    let denom = (window * (window + 1)) as f64 / 2.0;
    rolling_apply(close, window, |slice| {
        slice
            .iter()
            .enumerate()
            .map(|(j, v)| (j + 1) as f64 * v)
            .sum::<f64>()
            / denom
    })
}

/// Hull moving average: WMA(2·WMA(w/2) − WMA(w), √w).
pub fn hma(close: &[f64], window: usize) -> Vec<f64> {
    let half = (window / 2).max(1);
    let sqrt_w = (window as f64).sqrt().round().max(1.0) as usize;

    let wma_half = wma(close, half);
    let wma_full = wma(close, window);
    let raw: Vec<f64> = wma_half
        .iter()
        .zip(&wma_full)
        .map(|(&h, &f)| 2.0 * h - f)
        .collect();

    wma(&raw, sqrt_w)
}

/// Double EMA: 2·EMA − EMA(EMA).
pub fn dema(close: &[f64], window: usize) -> Vec<f64> {
    let e1 = ema(close, window);
    let e2 = ema(&e1, window);
    e1.iter().zip(&e2).map(|(&a, &b)| 2.0 * a - b).collect()
}

/// Triple EMA: 3·EMA − 3·EMA(EMA) + EMA(EMA(EMA)).
pub fn tema(close: &[f64], window: usize) -> Vec<f64> {
    let e1 = ema(close, window);
    let e2 = ema(&e1, window);
    let e3 = ema(&e2, window);
    e1.iter()
        .zip(&e2)
        .zip(&e3)
        .map(|((&a, &b), &c)| 3.0 * a - 3.0 * b + c)
        .collect()
}

/// Kaufman adaptive moving average with the standard fast=2, slow=30 spans.
///
/// Efficiency ratio over `window` drives the smoothing constant; seeded with
/// the SMA of the first full window.
pub fn kama(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window + 1 {
        return out;
    }

    let fast_sc = 2.0 / (2.0 + 1.0);
    let slow_sc = 2.0 / (30.0 + 1.0);

    // Seed at the end of the first full window of finite closes.
    let mut seed = None;
    for i in window..n {
        if close[i - window..=i].iter().all(|v| v.is_finite()) {
            seed = Some(i);
            break;
        }
    }
    let Some(start) = seed else {
        return out;
    };

    out[start] = mean(&close[start + 1 - window..=start]);
    for i in (start + 1)..n {
        if !close[i].is_finite() {
            break;
        }
        let change = (close[i] - close[i - window]).abs();
        let volatility: f64 = (i - window + 1..=i)
            .map(|j| (close[j] - close[j - 1]).abs())
            .sum();
        let er = if volatility > 0.0 { change / volatility } else { 0.0 };
        let sc = (er * (fast_sc - slow_sc) + slow_sc).powi(2);
        out[i] = out[i - 1] + sc * (close[i] - out[i - 1]);
    }
    out
}
