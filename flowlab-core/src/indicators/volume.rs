//! Volume family: OBV rate-of-change, rolling VWAP ratio, MFI, A/D line and
//! oscillator.

use super::{pct_change, recursive_smooth};

/// On-balance volume: running sum of volume signed by the close change.
fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if n == 0 {
        return out;
    }
    out[0] = 0.0;
    for i in 1..n {
        if !close[i].is_finite() || !close[i - 1].is_finite() || !volume[i].is_finite() {
            break;
        }
        let delta = if close[i] > close[i - 1] {
            volume[i]
        } else if close[i] < close[i - 1] {
            -volume[i]
        } else {
            0.0
        };
        out[i] = out[i - 1] + delta;
    }
    out
}

/// Percent change of OBV over `window` bars.
///
/// NaN where OBV was zero `window` bars ago (ratio undefined).
pub fn obv_roc(close: &[f64], volume: &[f64], window: usize) -> Vec<f64> {
    pct_change(&obv(close, volume), window)
        .iter()
        .map(|r| r * 100.0)
        .collect()
}

/// Close divided by the rolling volume-weighted average price.
pub fn vwap_ratio(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
    window: usize,
) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let mut pv = 0.0;
        let mut vol = 0.0;
        let mut valid = true;
        for j in (i + 1 - window)..=i {
            let tp = (high[j] + low[j] + close[j]) / 3.0;
            if !tp.is_finite() || !volume[j].is_finite() {
                valid = false;
                break;
            }
            pv += tp * volume[j];
            vol += volume[j];
        }
        if valid && vol > 0.0 && close[i].is_finite() {
            out[i] = close[i] / (pv / vol);
        }
    }
    out
}

/// Money Flow Index: volume-weighted RSI analogue over the typical price.
///
/// Zero negative flow ⇒ 100.
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window + 1 {
        return out;
    }

    let tp: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();

    for i in window..n {
        let mut positive = 0.0;
        let mut negative = 0.0;
        let mut valid = true;
        for j in (i - window + 1)..=i {
            if !tp[j].is_finite() || !tp[j - 1].is_finite() || !volume[j].is_finite() {
                valid = false;
                break;
            }
            let flow = tp[j] * volume[j];
            if tp[j] > tp[j - 1] {
                positive += flow;
            } else if tp[j] < tp[j - 1] {
                negative += flow;
            }
        }
        if !valid {
            continue;
        }
        out[i] = if negative == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + positive / negative)
        };
    }
    out
}

/// Accumulation/Distribution line: cumulative money-flow volume.
///
/// Money-flow multiplier ((C−L)−(H−C))/(H−L); zero when high == low.
pub fn ad_line(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    let mut running = 0.0;
    for i in 0..n {
        if !high[i].is_finite() || !low[i].is_finite() || !close[i].is_finite() {
            break;
        }
        let range = high[i] - low[i];
        let mfm = if range > 0.0 {
            ((close[i] - low[i]) - (high[i] - close[i])) / range
        } else {
            0.0
        };
        running += mfm * volume[i];
        out[i] = running;
    }
    out
}

/// A/D oscillator (Chaikin): EMA(3) − EMA(10) of the A/D line.
pub fn ad_oscillator(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let ad = ad_line(high, low, close, volume);
    let fast = recursive_smooth(&ad, 3, 2.0 / 4.0);
    let slow = recursive_smooth(&ad, 10, 2.0 / 11.0);
    fast.iter().zip(&slow).map(|(&f, &s)| f - s).collect()
}
