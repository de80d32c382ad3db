//! Indicator library — pure functions over price arrays.
//!
//! Every indicator is a deterministic function from `(series, window)` to a
//! same-length output array. Leading positions are NaN until the indicator's
//! warm-up completes; thereafter finite. No global state: memoization is the
//! cache's concern, not the library's.
//!
//! `MetricId` is the registry of supported names. Parsing accepts both the
//! flowchart display names ("Relative Strength Index") and short codes
//! ("RSI"); unknown names fail at tree-loading time, never mid-simulation.
//!
//! Unit conventions are pinned per name (see the table in DESIGN.md):
//! `Drawdown` and `Max Drawdown` are negative percentages, `Rate of Change`
//! and friends are percentages, `Price vs SMA` and `VWAP Ratio` are plain
//! ratios.

pub mod momentum;
pub mod moving_averages;
pub mod oscillators;
pub mod trend;
pub mod volatility;
pub mod volume;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from the indicator layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("unknown indicator name: '{0}'")]
    UnknownName(String),
    #[error("invalid window {window} for {metric}")]
    InvalidWindow { metric: String, window: usize },
}

/// Read-only view over one ticker's aligned arrays.
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    pub open: &'a [f64],
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
    pub adj_close: &'a [f64],
    pub volume: &'a [f64],
}

impl<'a> SeriesView<'a> {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

macro_rules! metric_registry {
    ($( $variant:ident => $canonical:literal $(, $alias:literal)* ; )+) => {
        /// Registry of supported indicator names.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum MetricId {
            $( $variant, )+
        }

        impl MetricId {
            /// Canonical display name (the flowchart wire format).
            pub fn name(&self) -> &'static str {
                match self {
                    $( MetricId::$variant => $canonical, )+
                }
            }
        }

        impl FromStr for MetricId {
            type Err = IndicatorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $( $canonical $( | $alias )* => Ok(MetricId::$variant), )+
                    other => Err(IndicatorError::UnknownName(other.to_string())),
                }
            }
        }
    };
}

metric_registry! {
    // Price
    CurrentPrice => "Current Price";
    // Moving averages
    Sma => "Simple Moving Average", "SMA";
    Ema => "Exponential Moving Average", "EMA";
    Wma => "Weighted Moving Average", "WMA";
    Hma => "Hull Moving Average", "HMA";
    Dema => "DEMA";
    Tema => "TEMA";
    Kama => "KAMA";
    WilderMa => "Wilder Moving Average", "RMA";
    // Oscillators
    Rsi => "Relative Strength Index", "RSI";
    StochRsi => "Stochastic RSI";
    WilliamsR => "Williams %R";
    Cci => "CCI";
    Cmo => "Chande Momentum Oscillator", "CMO";
    StochK => "Stochastic %K";
    StochD => "Stochastic %D";
    // Momentum
    Roc => "Rate of Change", "ROC";
    Momentum => "Momentum", "MOM";
    MacdHistogram => "MACD Histogram";
    PpoHistogram => "PPO Histogram";
    AroonUp => "Aroon Up";
    AroonDown => "Aroon Down";
    AroonOscillator => "Aroon Oscillator";
    Adx => "ADX";
    PlusDi => "Plus DI", "+DI";
    MinusDi => "Minus DI", "-DI";
    // Volatility
    StdDevReturns => "Standard Deviation";
    StdDevPrice => "Standard Deviation of Price";
    Atr => "ATR", "Average True Range";
    AtrPercent => "ATR %", "NATR";
    BollingerPercentB => "Bollinger %B";
    BollingerBandwidth => "Bollinger Bandwidth";
    UlcerIndex => "Ulcer Index";
    HistoricalVolatility => "Historical Volatility";
    Drawdown => "Drawdown";
    MaxDrawdown => "Max Drawdown";
    // Trend
    LinRegSlope => "Linear Reg Slope";
    LinRegValue => "Linear Reg Value";
    PriceVsSma => "Price vs SMA";
    TrendClarity => "Trend Clarity";
    CumulativeReturn => "Cumulative Return";
    SmaOfReturns => "SMA of Returns";
    // Volume
    ObvRoc => "OBV Rate of Change";
    VwapRatio => "VWAP Ratio";
    Mfi => "Money Flow Index", "MFI";
    AdLine => "Accumulation/Distribution", "AD";
    AdOscillator => "A/D Oscillator", "ADOSC";
}

impl MetricId {
    /// Whether the `window` parameter participates in the formula.
    ///
    /// MACD/PPO histograms use the fixed (12, 26, 9) parameterization and the
    /// A/D line and oscillator use fixed spans, so a condition's window is
    /// ignored for those names.
    pub fn uses_window(&self) -> bool {
        !matches!(
            self,
            MetricId::CurrentPrice
                | MetricId::MacdHistogram
                | MetricId::PpoHistogram
                | MetricId::AdLine
                | MetricId::AdOscillator
        )
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for MetricId {
    type Error = IndicatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricId> for String {
    fn from(metric: MetricId) -> String {
        metric.name().to_string()
    }
}

/// Compute a metric series for one ticker.
///
/// Output has the same length as the input arrays, NaN through warm-up.
/// Fails only on a structurally invalid request (zero window for a windowed
/// metric); missing data shows up as NaN, never as an error.
pub fn compute(
    metric: MetricId,
    series: &SeriesView<'_>,
    window: usize,
) -> Result<Vec<f64>, IndicatorError> {
    if metric.uses_window() && window == 0 {
        return Err(IndicatorError::InvalidWindow {
            metric: metric.name().to_string(),
            window,
        });
    }

    let out = match metric {
        MetricId::CurrentPrice => series.close.to_vec(),

        MetricId::Sma => moving_averages::sma(series.close, window),
        MetricId::Ema => moving_averages::ema(series.close, window),
        MetricId::Wma => moving_averages::wma(series.close, window),
        MetricId::Hma => moving_averages::hma(series.close, window),
        MetricId::Dema => moving_averages::dema(series.close, window),
        MetricId::Tema => moving_averages::tema(series.close, window),
        MetricId::Kama => moving_averages::kama(series.close, window),
        MetricId::WilderMa => moving_averages::wilder_ma(series.close, window),

        MetricId::Rsi => oscillators::rsi(series.close, window),
        MetricId::StochRsi => oscillators::stoch_rsi(series.close, window),
        MetricId::WilliamsR => {
            oscillators::williams_r(series.high, series.low, series.close, window)
        }
        MetricId::Cci => oscillators::cci(series.high, series.low, series.close, window),
        MetricId::Cmo => oscillators::cmo(series.close, window),
        MetricId::StochK => oscillators::stoch_k(series.high, series.low, series.close, window),
        MetricId::StochD => oscillators::stoch_d(series.high, series.low, series.close, window),

        MetricId::Roc => momentum::roc(series.close, window),
        MetricId::Momentum => momentum::momentum(series.close, window),
        MetricId::MacdHistogram => momentum::macd_histogram(series.close),
        MetricId::PpoHistogram => momentum::ppo_histogram(series.close),
        MetricId::AroonUp => momentum::aroon_up(series.high, window),
        MetricId::AroonDown => momentum::aroon_down(series.low, window),
        MetricId::AroonOscillator => momentum::aroon_oscillator(series.high, series.low, window),
        MetricId::Adx => momentum::adx(series.high, series.low, series.close, window),
        MetricId::PlusDi => momentum::plus_di(series.high, series.low, series.close, window),
        MetricId::MinusDi => momentum::minus_di(series.high, series.low, series.close, window),

        MetricId::StdDevReturns => volatility::stddev_returns(series.close, window),
        MetricId::StdDevPrice => volatility::stddev_price(series.close, window),
        MetricId::Atr => volatility::atr(series.high, series.low, series.close, window),
        MetricId::AtrPercent => {
            volatility::atr_percent(series.high, series.low, series.close, window)
        }
        MetricId::BollingerPercentB => volatility::bollinger_percent_b(series.close, window),
        MetricId::BollingerBandwidth => volatility::bollinger_bandwidth(series.close, window),
        MetricId::UlcerIndex => volatility::ulcer_index(series.close, window),
        MetricId::HistoricalVolatility => volatility::historical_volatility(series.close, window),
        MetricId::Drawdown => volatility::drawdown(series.close, window),
        MetricId::MaxDrawdown => volatility::max_drawdown(series.close, window),

        MetricId::LinRegSlope => trend::linreg_slope(series.close, window),
        MetricId::LinRegValue => trend::linreg_value(series.close, window),
        MetricId::PriceVsSma => trend::price_vs_sma(series.close, window),
        MetricId::TrendClarity => trend::trend_clarity(series.close, window),
        MetricId::CumulativeReturn => trend::cumulative_return(series.close, window),
        MetricId::SmaOfReturns => trend::sma_of_returns(series.close, window),

        MetricId::ObvRoc => volume::obv_roc(series.close, series.volume, window),
        MetricId::VwapRatio => volume::vwap_ratio(
            series.high,
            series.low,
            series.close,
            series.volume,
            window,
        ),
        MetricId::Mfi => volume::mfi(
            series.high,
            series.low,
            series.close,
            series.volume,
            window,
        ),
        MetricId::AdLine => volume::ad_line(series.high, series.low, series.close, series.volume),
        MetricId::AdOscillator => {
            volume::ad_oscillator(series.high, series.low, series.close, series.volume)
        }
    };

    Ok(out)
}

// ── Shared numeric helpers ──────────────────────────────────────────

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1, matching pandas rolling `.std()`).
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Apply `f` to each full window of finite values; NaN elsewhere.
pub(crate) fn rolling_apply<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            out[i] = f(slice);
        }
    }
    out
}

/// Rolling maximum with `min_periods = 1`: partial leading windows allowed.
pub(crate) fn rolling_max_mp1(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    for i in 0..n {
        let start = (i + 1).saturating_sub(window);
        let max = values[start..=i]
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max);
        out[i] = max;
    }
    out
}

/// Percent change over `periods` bars, as a fraction.
pub(crate) fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if periods == 0 {
        return out;
    }
    for i in periods..n {
        let prev = values[i - periods];
        let curr = values[i];
        if prev.is_finite() && curr.is_finite() && prev != 0.0 {
            out[i] = curr / prev - 1.0;
        }
    }
    out
}

/// True range: max(high − low, |high − prev_close|, |low − prev_close|).
pub(crate) fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if n == 0 {
        return out;
    }
    out[0] = high[0] - low[0];
    for i in 1..n {
        let prev_close = close[i - 1];
        if high[i].is_finite() && low[i].is_finite() && prev_close.is_finite() {
            out[i] = (high[i] - low[i])
                .max((high[i] - prev_close).abs())
                .max((low[i] - prev_close).abs());
        }
    }
    out
}

/// Recursive smoothing seeded with the SMA of the first full finite window.
///
/// EMA uses α = 2/(w+1); Wilder smoothing uses α = 1/w. A NaN after the
/// seed truncates the series (the remainder stays NaN).
pub(crate) fn recursive_smooth(values: &[f64], window: usize, alpha: f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }

    let mut seed_idx = None;
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            seed_idx = Some(i);
            break;
        }
    }
    let Some(seed) = seed_idx else {
        return out;
    };

    out[seed] = mean(&values[seed + 1 - window..=seed]);
    for i in (seed + 1)..n {
        if !values[i].is_finite() {
            break;
        }
        out[i] = alpha * values[i] + (1.0 - alpha) * out[i - 1];
    }
    out
}

// ── Test support ────────────────────────────────────────────────────

/// Owned synthetic series for indicator tests.
///
/// Generates plausible OHLCV from closes: open = prev close, high/low pad
/// the open/close range by 1.0, flat volume.
#[cfg(test)]
pub(crate) struct TestSeries {
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

#[cfg(test)]
impl TestSeries {
    pub fn from_closes(closes: &[f64]) -> Self {
        let open: Vec<f64> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| if i == 0 { c } else { closes[i - 1] })
            .collect();
        let high: Vec<f64> = open
            .iter()
            .zip(closes)
            .map(|(&o, &c)| o.max(c) + 1.0)
            .collect();
        let low: Vec<f64> = open
            .iter()
            .zip(closes)
            .map(|(&o, &c)| o.min(c) - 1.0)
            .collect();
        Self {
            open,
            high,
            low,
            close: closes.to_vec(),
            volume: vec![1000.0; closes.len()],
        }
    }

    pub fn view(&self) -> SeriesView<'_> {
        SeriesView {
            open: &self.open,
            high: &self.high,
            low: &self.low,
            close: &self.close,
            adj_close: &self.close,
            volume: &self.volume,
        }
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}
