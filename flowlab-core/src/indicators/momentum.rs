//! Momentum family: ROC, MOM, MACD/PPO histograms, Aroon, ADX, ±DI.

use super::{mean, pct_change, recursive_smooth};

/// Rate of change over `window` bars, as a percentage.
pub fn roc(close: &[f64], window: usize) -> Vec<f64> {
    pct_change(close, window).iter().map(|r| r * 100.0).collect()
}

/// Raw momentum: close − close `window` bars ago.
pub fn momentum(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    for i in window..n {
        if close[i].is_finite() && close[i - window].is_finite() {
            out[i] = close[i] - close[i - window];
        }
    }
    out
}

/// MACD histogram with the fixed (12, 26, 9) parameterization.
pub fn macd_histogram(close: &[f64]) -> Vec<f64> {
    let fast = recursive_smooth(close, 12, 2.0 / 13.0);
    let slow = recursive_smooth(close, 26, 2.0 / 27.0);
    let macd: Vec<f64> = fast.iter().zip(&slow).map(|(&f, &s)| f - s).collect();
    let signal = recursive_smooth(&macd, 9, 2.0 / 10.0);
    macd.iter().zip(&signal).map(|(&m, &s)| m - s).collect()
}

/// PPO histogram: like MACD but the line is (fast − slow)/slow × 100.
pub fn ppo_histogram(close: &[f64]) -> Vec<f64> {
    let fast = recursive_smooth(close, 12, 2.0 / 13.0);
    let slow = recursive_smooth(close, 26, 2.0 / 27.0);
    let ppo: Vec<f64> = fast
        .iter()
        .zip(&slow)
        .map(|(&f, &s)| {
            if s.is_finite() && s != 0.0 {
                (f - s) / s * 100.0
            } else {
                f64::NAN
            }
        })
        .collect();
    let signal = recursive_smooth(&ppo, 9, 2.0 / 10.0);
    ppo.iter().zip(&signal).map(|(&p, &s)| p - s).collect()
}

/// Bars since the most recent extreme within the trailing `window + 1` bars.
///
/// Ties resolve to the most recent occurrence.
fn bars_since_extreme(values: &[f64], i: usize, window: usize, want_max: bool) -> Option<usize> {
    let start = i - window;
    let slice = &values[start..=i];
    if slice.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mut best = 0;
    for (j, &v) in slice.iter().enumerate() {
        let better = if want_max {
            v >= slice[best]
        } else {
            v <= slice[best]
        };
        if better {
            best = j;
        }
    }
    Some(window - best)
}

/// Aroon Up: ((w − bars since highest high)/w) × 100.
pub fn aroon_up(high: &[f64], window: usize) -> Vec<f64> {
    let n = high.len();
    let mut out = vec![f64::NAN; n];
    for i in window..n {
        if let Some(since) = bars_since_extreme(high, i, window, true) {
            out[i] = (window - since) as f64 / window as f64 * 100.0;
        }
    }
    out
}

/// Aroon Down: ((w − bars since lowest low)/w) × 100.
pub fn aroon_down(low: &[f64], window: usize) -> Vec<f64> {
    let n = low.len();
    let mut out = vec![f64::NAN; n];
    for i in window..n {
        if let Some(since) = bars_since_extreme(low, i, window, false) {
            out[i] = (window - since) as f64 / window as f64 * 100.0;
        }
    }
    out
}

/// Aroon Oscillator: Up − Down, in [−100, 100].
pub fn aroon_oscillator(high: &[f64], low: &[f64], window: usize) -> Vec<f64> {
    aroon_up(high, window)
        .iter()
        .zip(aroon_down(low, window))
        .map(|(&u, d)| u - d)
        .collect()
}

/// Wilder-smoothed running sums of TR, +DM, −DM.
///
/// Values become finite at index `window`; s[i] = s[i−1] − s[i−1]/w + x[i].
fn smoothed_directional(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    window: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = close.len();
    let mut tr = vec![f64::NAN; n];
    let mut pdm = vec![f64::NAN; n];
    let mut mdm = vec![f64::NAN; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        tr[i] = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        pdm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        mdm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }

    let smooth = |values: &[f64]| -> Vec<f64> {
        let mut out = vec![f64::NAN; n];
        if n < window + 1 {
            return out;
        }
        let seed: f64 = values[1..=window].iter().sum();
        if !seed.is_finite() {
            return out;
        }
        out[window] = seed;
        for i in (window + 1)..n {
            if !values[i].is_finite() {
                break;
            }
            out[i] = out[i - 1] - out[i - 1] / window as f64 + values[i];
        }
        out
    };

    (smooth(&tr), smooth(&pdm), smooth(&mdm))
}

/// +DI: 100 × smoothed +DM / smoothed TR.
pub fn plus_di(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let (tr, pdm, _) = smoothed_directional(high, low, close, window);
    tr.iter()
        .zip(&pdm)
        .map(|(&t, &p)| if t > 0.0 { 100.0 * p / t } else { f64::NAN })
        .collect()
}

/// −DI: 100 × smoothed −DM / smoothed TR.
pub fn minus_di(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let (tr, _, mdm) = smoothed_directional(high, low, close, window);
    tr.iter()
        .zip(&mdm)
        .map(|(&t, &m)| if t > 0.0 { 100.0 * m / t } else { f64::NAN })
        .collect()
}

/// Average Directional Index: Wilder-smoothed DX.
///
/// DX = 100·|+DI − −DI|/(+DI + −DI); the ADX seed is the mean of the first
/// `window` DX values, so the first finite ADX lands at index 2·window − 1.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let pdi = plus_di(high, low, close, window);
    let mdi = minus_di(high, low, close, window);

    let mut dx = vec![f64::NAN; n];
    for i in 0..n {
        if pdi[i].is_finite() && mdi[i].is_finite() {
            let total = pdi[i] + mdi[i];
            dx[i] = if total > 0.0 {
                100.0 * (pdi[i] - mdi[i]).abs() / total
            } else {
                0.0
            };
        }
    }

    let mut out = vec![f64::NAN; n];
    let seed_end = 2 * window - 1;
    if n <= seed_end {
        return out;
    }
    let seed_slice = &dx[window..=seed_end];
    if seed_slice.iter().any(|v| !v.is_finite()) {
        return out;
    }
    out[seed_end] = mean(seed_slice);
    let w = window as f64;
    for i in (seed_end + 1)..n {
        if !dx[i].is_finite() {
            break;
        }
        out[i] = (out[i - 1] * (w - 1.0) + dx[i]) / w;
    }
    out
}
