//! Bounded oscillators: RSI, StochRSI, Williams %R, CCI, CMO, Stoch %K/%D.

use super::{mean, rolling_apply};

/// Rolling (min, max) over a full window; NaN pair where the window is
/// incomplete or contains NaN.
pub(crate) fn rolling_extremes(values: &[f64], window: usize) -> (Vec<f64>, Vec<f64>) {
    let n = values.len();
    let mut lows = vec![f64::NAN; n];
    let mut highs = vec![f64::NAN; n];
    if window == 0 || n < window {
        return (lows, highs);
    }
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            lows[i] = slice.iter().copied().fold(f64::INFINITY, f64::min);
            highs[i] = slice.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        }
    }
    (lows, highs)
}

/// Relative Strength Index with Wilder smoothing.
///
/// Seeded with the plain average of the first `window` changes; thereafter
/// avg ← (avg·(w−1) + x)/w. avg_loss == 0 ⇒ RSI = 100.
/// First finite value lands at index `window`.
pub fn rsi(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window + 1 {
        return out;
    }

    let mut changes = vec![f64::NAN; n];
    for i in 1..n {
        if close[i].is_finite() && close[i - 1].is_finite() {
            changes[i] = close[i] - close[i - 1];
        }
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &ch in &changes[1..=window] {
        if ch.is_nan() {
            return out;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= window as f64;
    avg_loss /= window as f64;
    out[window] = rsi_value(avg_gain, avg_loss);

    let w = window as f64;
    for i in (window + 1)..n {
        if changes[i].is_nan() {
            break;
        }
        let gain = changes[i].max(0.0);
        let loss = (-changes[i]).max(0.0);
        avg_gain = (avg_gain * (w - 1.0) + gain) / w;
        avg_loss = (avg_loss * (w - 1.0) + loss) / w;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Stochastic of RSI: position of RSI within its own rolling range, 0..100.
pub fn stoch_rsi(close: &[f64], window: usize) -> Vec<f64> {
    let base = rsi(close, window);
    let (lows, highs) = rolling_extremes(&base, window);
    base.iter()
        .zip(lows.iter().zip(&highs))
        .map(|(&r, (&lo, &hi))| {
            if r.is_finite() && hi > lo {
                (r - lo) / (hi - lo) * 100.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Williams %R: (highest high − close) / (highest high − lowest low) × −100.
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let (_, highest) = rolling_extremes(high, window);
    let (lowest, _) = rolling_extremes(low, window);
    close
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let hh = highest[i];
            let ll = lowest[i];
            if c.is_finite() && hh.is_finite() && ll.is_finite() && hh > ll {
                (hh - c) / (hh - ll) * -100.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Commodity Channel Index over the typical price (H+L+C)/3.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let tp: Vec<f64> = high
        .iter()
        .zip(low.iter().zip(close))
        .map(|(&h, (&l, &c))| (h + l + c) / 3.0)
        .collect();

    let n = tp.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &tp[i + 1 - window..=i];
        if slice.iter().any(|v| !v.is_finite()) {
            continue;
        }
        let m = mean(slice);
        let mad = slice.iter().map(|v| (v - m).abs()).sum::<f64>() / window as f64;
        if mad > 0.0 {
            out[i] = (tp[i] - m) / (0.015 * mad);
        }
    }
    out
}

/// Chande Momentum Oscillator: 100 · (Σgains − Σlosses)/(Σgains + Σlosses).
pub fn cmo(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window + 1 {
        return out;
    }
    for i in window..n {
        let mut gains = 0.0;
        let mut losses = 0.0;
        let mut valid = true;
        for j in (i - window + 1)..=i {
            if !close[j].is_finite() || !close[j - 1].is_finite() {
                valid = false;
                break;
            }
            let ch = close[j] - close[j - 1];
            if ch > 0.0 {
                gains += ch;
            } else {
                losses -= ch;
            }
        }
        if !valid {
            continue;
        }
        let total = gains + losses;
        out[i] = if total > 0.0 {
            100.0 * (gains - losses) / total
        } else {
            0.0
        };
    }
    out
}

/// Fast stochastic %K: position of close within the rolling high/low range.
pub fn stoch_k(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let (_, highest) = rolling_extremes(high, window);
    let (lowest, _) = rolling_extremes(low, window);
    close
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let hh = highest[i];
            let ll = lowest[i];
            if c.is_finite() && hh.is_finite() && ll.is_finite() && hh > ll {
                (c - ll) / (hh - ll) * 100.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Stochastic %D: 3-bar SMA of %K.
pub fn stoch_d(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(&stoch_k(high, low, close, window), 3, mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, TestSeries};

    #[test]
    fn rsi_all_gains_is_100() {
        let out = rsi(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0], 3);
        assert_approx(out[3], 100.0, 1e-9);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let out = rsi(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0], 3);
        assert_approx(out[3], 0.0, 1e-9);
    }

    #[test]
    fn rsi_known_mix() {
        // Changes: +0.34, -0.25, -0.48 → seed avg_gain 0.34/3, avg_loss 0.73/3
        // RSI[3] = 100 - 100/(1 + 0.34/0.73) = 31.77...
        let out = rsi(&[44.0, 44.34, 44.09, 43.61], 3);
        assert_approx(out[3], 100.0 - 100.0 / (1.0 + 0.34 / 0.73), 1e-9);
    }

    #[test]
    fn rsi_bounded() {
        let closes = vec![100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0];
        for &v in rsi(&closes, 3).iter().filter(|v| v.is_finite()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn rsi_warmup_length() {
        let out = rsi(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!(out[2].is_finite());
    }

    #[test]
    fn rsi_nan_in_seed_poisons_series() {
        let mut closes = vec![100.0, 101.0, 102.0, 103.0, 104.0];
        closes[2] = f64::NAN;
        assert!(rsi(&closes, 3).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn williams_r_bounded() {
        let s = TestSeries::from_closes(&[100.0, 102.0, 101.0, 105.0, 99.0, 103.0]);
        let v = s.view();
        for &x in williams_r(v.high, v.low, v.close, 3)
            .iter()
            .filter(|x| x.is_finite())
        {
            assert!((-100.0..=0.0).contains(&x), "%R out of range: {x}");
        }
    }

    #[test]
    fn stoch_k_at_range_top_is_100() {
        // Close hits the rolling high exactly when high == close.
        let high = vec![10.0, 11.0, 12.0];
        let low = vec![9.0, 9.5, 10.0];
        let close = vec![9.5, 10.0, 12.0];
        let out = stoch_k(&high, &low, &close, 3);
        assert_approx(out[2], 100.0, 1e-9);
    }

    #[test]
    fn cmo_flat_series_is_zero() {
        let out = cmo(&[50.0; 10], 3);
        assert_approx(out[5], 0.0, 1e-12);
    }

    #[test]
    fn cmo_bounded() {
        let closes = vec![10.0, 12.0, 11.0, 13.0, 12.5, 14.0, 13.0];
        for &v in cmo(&closes, 3).iter().filter(|v| v.is_finite()) {
            assert!((-100.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn cci_centered_on_flat_series() {
        let s = TestSeries::from_closes(&[100.0; 8]);
        let v = s.view();
        let out = cci(v.high, v.low, v.close, 4);
        // Flat tp → mad from the high/low padding only on bar 0's open; values near 0
        for &x in out.iter().filter(|x| x.is_finite()) {
            assert!(x.abs() < 200.0);
        }
    }

    #[test]
    fn stoch_rsi_bounded() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();
        for &v in stoch_rsi(&closes, 5).iter().filter(|v| v.is_finite()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn stoch_d_lags_stoch_k() {
        let s = TestSeries::from_closes(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let v = s.view();
        let k = stoch_k(v.high, v.low, v.close, 3);
        let d = stoch_d(v.high, v.low, v.close, 3);
        let first_k = k.iter().position(|x| x.is_finite()).unwrap();
        let first_d = d.iter().position(|x| x.is_finite()).unwrap();
        assert!(first_d >= first_k + 2);
    }
}
