//! Backtest runner — wires panel, evaluator, simulator, metrics and the
//! IS/OOS splitter into one entry point.
//!
//! Two entry points:
//! - `run_backtest()`: collects tickers from the tree, builds a panel from
//!   the bar store, then runs. Used for one-off backtests.
//! - `run_backtest_on_panel()`: takes a pre-built shared panel. Used by the
//!   sweep coordinator, which builds the panel once per sweep.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowlab_core::cache::IndicatorCache;
use flowlab_core::data::{build_panel, BarStore, PanelError, PricePanel};
use flowlab_core::domain::{normalize_symbol, Allocation};
use flowlab_core::engine::simulate;
use flowlab_core::eval::EvalError;
use flowlab_core::indicators::IndicatorError;
use flowlab_core::strategy::node::{FlowNode, TreeError};
use flowlab_core::strategy::{collect_condition_tickers, collect_position_tickers};

use crate::metrics::{compute_metrics, MetricsInput, MetricsReport};
use crate::split::{split_indices, SplitConfig};

/// Benchmark symbol, always loaded alongside the tree's tickers.
pub const BENCHMARK_SYMBOL: &str = "SPY";

fn default_cost_bps() -> f64 {
    5.0
}

/// A single backtest request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    pub tree: FlowNode,
    /// Tickers the caller explicitly requires beyond what the tree
    /// references. Unlike tree tickers, a missing one here is an error.
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default = "default_cost_bps")]
    pub cost_bps: f64,
    #[serde(default)]
    pub split: SplitConfig,
}

/// Full result of one backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub metrics: MetricsReport,
    /// Without splitting, mirrors `metrics`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_metrics: Option<MetricsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oos_metrics: Option<MetricsReport>,
    /// `[unix_seconds, equity]` pairs in bar order.
    pub equity_curve: Vec<(i64, f64)>,
    /// Target allocation per bar, in bar order.
    pub allocations: Vec<Allocation>,
}

/// Fatal errors for a variant. Missing data inside conditions never lands
/// here — it degrades to false/empty during evaluation.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),
    #[error("malformed strategy tree: {0}")]
    MalformedTree(String),
    #[error("indicator error: {0}")]
    Indicator(#[from] IndicatorError),
    #[error("sweep cancelled")]
    Cancelled,
}

impl RunError {
    /// Stable machine-readable kind for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::InsufficientData(_) => "insufficient_data",
            RunError::UnknownTicker(_) => "unknown_ticker",
            RunError::MalformedTree(_) => "malformed_tree",
            RunError::Indicator(_) => "indicator",
            RunError::Cancelled => "cancelled",
        }
    }
}

impl From<PanelError> for RunError {
    fn from(err: PanelError) -> Self {
        // Store-level I/O failures surface as insufficient data: either way
        // the panel cannot be built for this variant.
        RunError::InsufficientData(err.to_string())
    }
}

impl From<TreeError> for RunError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Malformed(msg) => RunError::MalformedTree(msg),
            TreeError::Indicator(e) => RunError::Indicator(e),
        }
    }
}

impl From<EvalError> for RunError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Indicator(e) => RunError::Indicator(e),
        }
    }
}

/// Wire form of a fatal error: kind plus human-readable message. Partial
/// results are never attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_kind: String,
    pub message: String,
}

impl From<&RunError> for ErrorEnvelope {
    fn from(err: &RunError) -> Self {
        Self {
            error_kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Ticker sets a tree needs: (price tickers, indicator tickers), benchmark
/// included in both.
pub fn required_tickers(tree: &FlowNode) -> (Vec<String>, Vec<String>) {
    let mut price: Vec<String> = collect_position_tickers(tree).into_iter().collect();
    let mut indicator: Vec<String> = collect_condition_tickers(tree).into_iter().collect();
    let benchmark = normalize_symbol(BENCHMARK_SYMBOL);
    if !price.contains(&benchmark) {
        price.push(benchmark.clone());
    }
    if !indicator.contains(&benchmark) {
        indicator.push(benchmark);
    }
    (price, indicator)
}

/// Verify every explicitly requested ticker exists in the store.
///
/// Tree tickers are dropped silently when unknown; explicit ones fail.
pub fn check_explicit_tickers(
    store: &dyn BarStore,
    tickers: &[String],
) -> Result<Vec<String>, RunError> {
    let mut normalized = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let symbol = normalize_symbol(ticker);
        let series = store
            .get(&symbol)
            .map_err(|e| RunError::InsufficientData(e.to_string()))?;
        if series.is_empty() {
            return Err(RunError::UnknownTicker(symbol));
        }
        normalized.push(symbol);
    }
    Ok(normalized)
}

/// Run a single backtest, building the panel from the store.
pub fn run_backtest(
    store: &dyn BarStore,
    cache: &IndicatorCache,
    request: &BacktestRequest,
) -> Result<BacktestResult, RunError> {
    request.tree.validate()?;
    let (mut price, indicator) = required_tickers(&request.tree);
    for ticker in check_explicit_tickers(store, &request.tickers)? {
        if !price.contains(&ticker) {
            price.push(ticker);
        }
    }
    let panel = build_panel(store, &price, &indicator)?;
    run_backtest_on_panel(&request.tree, &panel, cache, request.cost_bps, &request.split)
}

/// Run a backtest against a pre-built panel (the sweep path).
pub fn run_backtest_on_panel(
    tree: &FlowNode,
    panel: &Arc<PricePanel>,
    cache: &IndicatorCache,
    cost_bps: f64,
    split: &SplitConfig,
) -> Result<BacktestResult, RunError> {
    let sim = simulate(tree, panel, cache, cost_bps)?;

    let input = MetricsInput {
        dates: &panel.dates,
        equities: &sim.equities,
        benchmark_close: panel.close(BENCHMARK_SYMBOL),
        allocations: &sim.allocations,
    };
    let metrics = compute_metrics(&input, None);

    let (is_metrics, oos_metrics) = if split.enabled {
        let (is_indices, oos_indices) = split_indices(&panel.dates, split);
        let is_metrics =
            (!is_indices.is_empty()).then(|| compute_metrics(&input, Some(&is_indices)));
        let oos_metrics =
            (!oos_indices.is_empty()).then(|| compute_metrics(&input, Some(&oos_indices)));
        (is_metrics, oos_metrics)
    } else {
        // No split: the full-period metrics double as IS.
        (Some(metrics.clone()), None)
    };

    let equity_curve: Vec<(i64, f64)> = panel
        .unix_seconds()
        .into_iter()
        .zip(sim.equities.iter().copied())
        .collect();

    Ok(BacktestResult {
        metrics,
        is_metrics,
        oos_metrics,
        equity_curve,
        allocations: sim.allocations,
    })
}
