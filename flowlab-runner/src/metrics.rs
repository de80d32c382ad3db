//! Performance metrics — pure functions from an equity curve to a report.
//!
//! One simulation pass produces one curve; every report (full period, IS,
//! OOS, walk-forward window) is computed from that same curve under an
//! optional index restriction. The simulator is never re-run for slicing.
//!
//! Conventions that must not drift:
//! - `max_drawdown` is a non-negative fraction (0.25 = 25%).
//! - `cagr`, `tim`, `win_rate` are fractions in [0, 1] territory.
//! - `beta`, `sharpe`, `sortino`, `calmar`, `treynor` are dimensionless.
//! - 252 trading periods per year; 3% annual risk-free rate for Treynor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use flowlab_core::domain::Allocation;

pub const PERIODS_PER_YEAR: f64 = 252.0;
pub const RISK_FREE_RATE: f64 = 0.03;

/// The fixed metric bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub start_date: Option<NaiveDate>,
    pub years: f64,
    pub cagr: f64,
    pub vol: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    pub beta: f64,
    pub treynor: f64,
    pub tim: f64,
    pub timar: f64,
    pub win_rate: f64,
    /// Number of bars the report covers.
    pub bar_count: usize,
}

impl MetricsReport {
    /// Report for degenerate inputs (fewer than 2 bars): all ratios zero.
    fn degenerate(start_date: Option<NaiveDate>, bar_count: usize) -> Self {
        Self {
            start_date,
            years: bar_count as f64 / PERIODS_PER_YEAR,
            cagr: 0.0,
            vol: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            max_drawdown: 0.0,
            beta: 0.0,
            treynor: 0.0,
            tim: 0.0,
            timar: 0.0,
            win_rate: 0.0,
            bar_count,
        }
    }
}

/// Inputs shared by every report computed from one simulation.
pub struct MetricsInput<'a> {
    pub dates: &'a [NaiveDate],
    pub equities: &'a [f64],
    /// Benchmark closes aligned with the same bars (SPY by convention).
    pub benchmark_close: Option<&'a [f64]>,
    pub allocations: &'a [Allocation],
}

/// Compute the metric bundle, optionally restricted to a subset of bar
/// indices (ascending, in-range).
///
/// Under restriction, returns/vol/beta come from the restricted values and
/// the benchmark at the same indices; the win rate still uses next-bar
/// returns of the FULL curve, so an invested bar at a slice boundary is
/// judged by what actually happened the next trading day.
pub fn compute_metrics(input: &MetricsInput<'_>, indices: Option<&[usize]>) -> MetricsReport {
    let full = input.equities;
    let selected: Vec<usize> = match indices {
        Some(set) => set.iter().copied().filter(|&i| i < full.len()).collect(),
        None => (0..full.len()).collect(),
    };

    let values: Vec<f64> = selected.iter().map(|&i| full[i]).collect();
    let start_date = selected.first().map(|&i| input.dates[i]);
    if values.len() < 2 {
        return MetricsReport::degenerate(start_date, values.len());
    }

    let years = values.len() as f64 / PERIODS_PER_YEAR;
    let returns = consecutive_returns(&values);

    let cagr = cagr_of(&values, years);
    let vol = population_std(&returns) * PERIODS_PER_YEAR.sqrt();
    let sharpe = sharpe_of(&returns);
    let sortino = sortino_of(&returns);
    let max_drawdown = max_drawdown_of(&values);
    let calmar = if max_drawdown > 0.0 { cagr / max_drawdown } else { 0.0 };

    let beta = match input.benchmark_close {
        Some(bench) => beta_of(&returns, bench, &selected),
        None => 0.0,
    };
    let treynor = if beta != 0.0 {
        (cagr - RISK_FREE_RATE) / beta
    } else {
        0.0
    };

    // Invested bars drive TIM and the win rate.
    let invested: Vec<usize> = selected
        .iter()
        .copied()
        .filter(|&i| {
            input
                .allocations
                .get(i)
                .map(|a| !a.is_empty())
                .unwrap_or(false)
        })
        .collect();
    let tim = invested.len() as f64 / values.len() as f64;
    let timar = if tim > 0.0 { cagr / tim } else { 0.0 };
    let win_rate = win_rate_of(full, &invested);

    MetricsReport {
        start_date,
        years,
        cagr,
        vol,
        sharpe,
        sortino,
        calmar,
        max_drawdown,
        beta,
        treynor,
        tim,
        timar,
        win_rate,
        bar_count: values.len(),
    }
}

// ── Individual metric functions ─────────────────────────────────────

/// Consecutive-bar simple returns.
pub fn consecutive_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn cagr_of(values: &[f64], years: f64) -> f64 {
    let first = values[0];
    let last = *values.last().expect("len checked");
    if first <= 0.0 || last <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    (last / first).powf(1.0 / years) - 1.0
}

fn sharpe_of(returns: &[f64]) -> f64 {
    let std = population_std(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean(returns) / std * PERIODS_PER_YEAR.sqrt()
}

/// Sortino: mean of ALL returns over the deviation of the negative ones.
///
/// No negative returns ⇒ 0 (the ratio is undefined, not infinite).
fn sortino_of(returns: &[f64]) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_std = population_std(&downside);
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean(returns) / downside_std * PERIODS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a non-negative fraction of the running peak.
pub fn max_drawdown_of(values: &[f64]) -> f64 {
    let mut peak = values[0];
    let mut max_dd = 0.0f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Covariance with the benchmark over its variance, on the same index set.
fn beta_of(strategy_returns: &[f64], benchmark_close: &[f64], selected: &[usize]) -> f64 {
    let bench_values: Vec<f64> = selected
        .iter()
        .copied()
        .filter(|&i| i < benchmark_close.len())
        .map(|i| benchmark_close[i])
        .collect();
    if bench_values.len() < 2 {
        return 0.0;
    }
    let bench_returns = consecutive_returns(&bench_values);
    let n = strategy_returns.len().min(bench_returns.len());
    if n < 2 {
        return 0.0;
    }

    let s = &strategy_returns[..n];
    let b = &bench_returns[..n];
    let s_mean = mean(s);
    let b_mean = mean(b);
    let covariance = s
        .iter()
        .zip(b)
        .map(|(x, y)| (x - s_mean) * (y - b_mean))
        .sum::<f64>()
        / n as f64;
    let variance = b.iter().map(|y| (y - b_mean).powi(2)).sum::<f64>() / n as f64;
    if variance > 0.0 {
        covariance / variance
    } else {
        0.0
    }
}

/// Fraction of invested bars whose next-bar return (on the full curve) was
/// positive.
fn win_rate_of(full_equities: &[f64], invested: &[usize]) -> f64 {
    let mut wins = 0usize;
    let mut counted = 0usize;
    for &i in invested {
        if i + 1 < full_equities.len() && full_equities[i] > 0.0 {
            counted += 1;
            if full_equities[i + 1] > full_equities[i] {
                wins += 1;
            }
        }
    }
    if counted == 0 {
        0.0
    } else {
        wins as f64 / counted as f64
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0), the convention the metric
/// formulas were fixed against.
fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
