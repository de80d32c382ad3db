//! IS/OOS partitioning of a completed simulation's bar indices.
//!
//! The slicer only produces index sets; per-slice metrics come from the
//! metrics engine's index restriction. Nothing here re-runs the simulator.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::metrics::{compute_metrics, MetricsInput, MetricsReport};

/// How bars are attributed to IS vs OOS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Odd calendar months → IS, even → OOS.
    EvenOddMonth,
    /// Odd years → IS, even → OOS.
    EvenOddYear,
    /// Earlier bars → IS, later → OOS, split at a date or a percentage.
    Chronological,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::EvenOddMonth
    }
}

/// Split configuration carried on a backtest request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: SplitStrategy,
    /// Absolute chronological threshold; bars strictly before it are IS.
    #[serde(default)]
    pub chronological_date: Option<NaiveDate>,
    /// Percentage of bars forming the IS prefix, used when no date is set.
    #[serde(default)]
    pub chronological_percent: Option<f64>,
}

/// Partition `dates` into (IS, OOS) index sets.
///
/// A chronological config with neither date nor percent falls back to
/// everything-IS, mirroring the disabled case.
pub fn split_indices(dates: &[NaiveDate], config: &SplitConfig) -> (Vec<usize>, Vec<usize>) {
    let mut is_indices = Vec::new();
    let mut oos_indices = Vec::new();

    let threshold = match config.strategy {
        SplitStrategy::Chronological => config.chronological_date.or_else(|| {
            config.chronological_percent.and_then(|percent| {
                let split = (dates.len() as f64 * percent / 100.0) as usize;
                (split > 0 && split < dates.len()).then(|| dates[split])
            })
        }),
        _ => None,
    };

    for (i, date) in dates.iter().enumerate() {
        let in_sample = match config.strategy {
            SplitStrategy::EvenOddMonth => date.month() % 2 == 1,
            SplitStrategy::EvenOddYear => date.year() % 2 == 1,
            SplitStrategy::Chronological => match threshold {
                Some(t) => *date < t,
                None => true,
            },
        };
        if in_sample {
            is_indices.push(i);
        } else {
            oos_indices.push(i);
        }
    }
    (is_indices, oos_indices)
}

// ── Expanding-window walk-forward ───────────────────────────────────

/// Calendar granularity of the sequential OOS windows.
///
/// Daily produces one window per bar, which multiplies work accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingPeriod {
    Yearly,
    Monthly,
    Daily,
}

/// One walk-forward window: OOS = `[oos_start, oos_end)`, IS = everything
/// before `oos_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkWindow {
    pub label: String,
    pub oos_start: usize,
    pub oos_end: usize,
}

/// Per-window metrics row in the walk-forward table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkForwardEntry {
    pub label: String,
    pub is_metrics: MetricsReport,
    pub oos_metrics: MetricsReport,
}

/// Partition the timeline into sequential calendar OOS windows from
/// `first_oos` onward.
///
/// A window starting at bar 0 has no history to train on and is skipped.
pub fn expanding_windows(
    dates: &[NaiveDate],
    period: RollingPeriod,
    first_oos: NaiveDate,
) -> Vec<WalkWindow> {
    let key = |date: &NaiveDate| match period {
        RollingPeriod::Yearly => (date.year(), 0u32, 0u32),
        RollingPeriod::Monthly => (date.year(), date.month(), 0),
        RollingPeriod::Daily => (date.year(), date.month(), date.day()),
    };
    let label = |date: &NaiveDate| match period {
        RollingPeriod::Yearly => format!("{}", date.year()),
        RollingPeriod::Monthly => format!("{}-{:02}", date.year(), date.month()),
        RollingPeriod::Daily => date.format("%Y-%m-%d").to_string(),
    };

    let mut windows: Vec<WalkWindow> = Vec::new();
    let mut current: Option<(String, (i32, u32, u32), usize)> = None;

    for (i, date) in dates.iter().enumerate() {
        if *date < first_oos {
            continue;
        }
        let k = key(date);
        match &current {
            Some((_, prev_key, _)) if *prev_key == k => {}
            _ => {
                if let Some((lbl, _, start)) = current.take() {
                    windows.push(WalkWindow {
                        label: lbl,
                        oos_start: start,
                        oos_end: i,
                    });
                }
                current = Some((label(date), k, i));
            }
        }
    }
    if let Some((lbl, _, start)) = current {
        windows.push(WalkWindow {
            label: lbl,
            oos_start: start,
            oos_end: dates.len(),
        });
    }

    windows.retain(|w| w.oos_start > 0);
    windows
}

/// Compute the per-window metrics table from one simulation's curve.
pub fn walk_forward_report(
    input: &MetricsInput<'_>,
    windows: &[WalkWindow],
) -> Vec<WalkForwardEntry> {
    windows
        .iter()
        .map(|window| {
            let is_indices: Vec<usize> = (0..window.oos_start).collect();
            let oos_indices: Vec<usize> = (window.oos_start..window.oos_end).collect();
            WalkForwardEntry {
                label: window.label.clone(),
                is_metrics: compute_metrics(input, Some(&is_indices)),
                oos_metrics: compute_metrics(input, Some(&oos_indices)),
            }
        })
        .collect()
}
