//! # FlowLab Runner
//!
//! Orchestration layer over `flowlab-core`:
//!
//! - `MetricsReport` / `compute_metrics`: the metric bundle, computable on
//!   the full curve or any index restriction of it
//! - `SplitConfig` / `split_indices`: IS/OOS attribution of one simulation
//! - `expanding_windows` / `walk_forward_report`: sequential walk-forward
//! - `SweepRequest` / `run_sweep`: parameter grids over a base tree with a
//!   shared panel and indicator cache
//! - `BacktestRequest` / `run_backtest`: single-variant entry point

pub mod metrics;
pub mod runner;
pub mod split;
pub mod sweep;

pub use metrics::{compute_metrics, MetricsInput, MetricsReport};
pub use runner::{
    run_backtest, run_backtest_on_panel, BacktestRequest, BacktestResult, ErrorEnvelope,
    RunError, BENCHMARK_SYMBOL,
};
pub use split::{
    expanding_windows, split_indices, walk_forward_report, RollingPeriod, SplitConfig,
    SplitStrategy, WalkForwardEntry, WalkWindow,
};
pub use sweep::{
    expand_combinations, expand_values, run_sweep, run_sweep_with_cache, AppliedParam,
    ParamRange, ParamTarget, SweepOptions, SweepReport, SweepRequest, SweepSummary,
    VariantRecord,
};
