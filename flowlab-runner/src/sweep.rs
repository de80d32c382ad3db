//! Parameter sweeps: expand ranges into variant trees and fan them out.
//!
//! A sweep shares one immutable panel and one indicator cache across every
//! variant, so a thousand RSI-threshold variants load prices once and
//! compute each indicator series once. Variants run embarrassingly parallel
//! under rayon; results come back in input-variant order regardless of
//! completion order.
//!
//! Cancellation is cooperative and lands at variant boundaries: in-flight
//! variants finish, unstarted ones report `cancelled`, and no partial
//! variant results are ever emitted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use flowlab_core::cache::{IndicatorCache, DEFAULT_CACHE_CAPACITY};
use flowlab_core::data::{build_panel, BarStore};
use flowlab_core::strategy::node::{Condition, FlowNode, NodeKind};

use crate::runner::{
    check_explicit_tickers, required_tickers, run_backtest_on_panel, BacktestResult,
    ErrorEnvelope, RunError,
};
use crate::split::SplitConfig;

fn default_true() -> bool {
    true
}

fn default_cost_bps() -> f64 {
    5.0
}

/// Which field of the targeted condition a range overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamTarget {
    Window,
    Threshold,
}

/// One numeric range over a location in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamRange {
    pub id: String,
    pub node_id: String,
    /// Condition to target within the node; absent for a function node's
    /// own window.
    #[serde(default)]
    pub condition_id: Option<String>,
    pub target: ParamTarget,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One parameter's concrete value inside a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedParam {
    pub range_id: String,
    pub value: f64,
}

/// Sweep request: base tree plus ranges, tickers, cost, and split
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    pub tree: FlowNode,
    #[serde(default)]
    pub parameter_ranges: Vec<ParamRange>,
    /// Explicitly required tickers; a missing one fails the whole sweep.
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default = "default_cost_bps")]
    pub cost_bps: f64,
    #[serde(default)]
    pub split: SplitConfig,
}

/// Execution knobs.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub parallel: bool,
    pub cache_capacity: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// One variant's outcome, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    pub index: usize,
    pub params: Vec<AppliedParam>,
    /// Content hash of the variant tree, for result deduplication.
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BacktestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl VariantRecord {
    pub fn is_ok(&self) -> bool {
        self.result.is_some()
    }
}

/// Outcome counts for the whole sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Failure counts keyed by `error_kind`.
    pub failures: BTreeMap<String, usize>,
}

/// Everything a sweep returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub variants: Vec<VariantRecord>,
    pub summary: SweepSummary,
}

// ── Range expansion ─────────────────────────────────────────────────

/// Discrete values of a range; `max` is always included even when the step
/// would skip past it. A non-positive step degenerates to `[min]`.
pub fn expand_values(min: f64, max: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || max < min {
        return vec![min];
    }
    let eps = step * 1e-9;
    let mut values = Vec::new();
    let mut current = min;
    while current <= max + eps {
        values.push(current);
        current += step;
    }
    let last = values.last().copied();
    match last {
        Some(last) if max - last > eps => values.push(max),
        None => values.push(min),
        _ => {}
    }
    values
}

/// Cartesian product over the enabled ranges. No enabled ranges ⇒ one empty
/// assignment (the base tree itself).
pub fn expand_combinations(ranges: &[ParamRange]) -> Vec<Vec<AppliedParam>> {
    let enabled: Vec<&ParamRange> = ranges.iter().filter(|r| r.enabled).collect();
    let mut combos: Vec<Vec<AppliedParam>> = vec![Vec::new()];
    for range in enabled {
        let values = expand_values(range.min, range.max, range.step);
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for &value in &values {
                let mut extended = combo.clone();
                extended.push(AppliedParam {
                    range_id: range.id.clone(),
                    value,
                });
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

// ── Variant construction ────────────────────────────────────────────

fn conditions_mut(kind: &mut NodeKind) -> Vec<&mut Condition> {
    match kind {
        NodeKind::Indicator { conditions } => conditions.iter_mut().collect(),
        NodeKind::AltExit { entry_conditions, exit_conditions } => entry_conditions
            .iter_mut()
            .chain(exit_conditions.iter_mut())
            .collect(),
        NodeKind::Numbered { items, .. } => items
            .iter_mut()
            .flat_map(|item| item.conditions.iter_mut())
            .collect(),
        _ => Vec::new(),
    }
}

fn apply_to_node(node: &mut FlowNode, range: &ParamRange, value: f64) {
    if node.id == range.node_id {
        match &range.condition_id {
            None => {
                if let (NodeKind::Function { window, .. }, ParamTarget::Window) =
                    (&mut node.kind, range.target)
                {
                    *window = value.round() as usize;
                }
            }
            Some(condition_id) => {
                for cond in conditions_mut(&mut node.kind) {
                    if cond.id.as_deref() == Some(condition_id.as_str()) {
                        match range.target {
                            ParamTarget::Window => cond.window = value.round() as usize,
                            ParamTarget::Threshold => cond.threshold = value,
                        }
                    }
                }
            }
        }
    }
    for children in node.children.values_mut() {
        for child in children {
            apply_to_node(child, range, value);
        }
    }
}

/// Deep-copy the base tree and overwrite the targeted fields.
pub fn apply_assignment(
    base: &FlowNode,
    ranges: &[ParamRange],
    assignment: &[AppliedParam],
) -> FlowNode {
    let by_id: BTreeMap<&str, &ParamRange> =
        ranges.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut tree = base.clone();
    for param in assignment {
        if let Some(range) = by_id.get(param.range_id.as_str()) {
            apply_to_node(&mut tree, range, param.value);
        }
    }
    tree
}

fn fingerprint(tree: &FlowNode, cost_bps: f64) -> String {
    let json = serde_json::to_string(tree).unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(json.as_bytes());
    hasher.update(&cost_bps.to_bits().to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

// ── Execution ───────────────────────────────────────────────────────

/// Run a sweep with a private indicator cache.
pub fn run_sweep(
    store: &dyn BarStore,
    request: &SweepRequest,
    options: &SweepOptions,
    cancel: &AtomicBool,
) -> Result<SweepReport, RunError> {
    let cache = IndicatorCache::new(options.cache_capacity);
    run_sweep_with_cache(store, request, options, cancel, &cache)
}

/// Run a sweep against a caller-owned cache (observable via `cache.stats()`).
pub fn run_sweep_with_cache(
    store: &dyn BarStore,
    request: &SweepRequest,
    options: &SweepOptions,
    cancel: &AtomicBool,
    cache: &IndicatorCache,
) -> Result<SweepReport, RunError> {
    request.tree.validate()?;

    // Ranges rewrite windows and thresholds, never tickers, so every
    // variant shares one panel.
    let (mut price, indicator) = required_tickers(&request.tree);
    for ticker in check_explicit_tickers(store, &request.tickers)? {
        if !price.contains(&ticker) {
            price.push(ticker);
        }
    }
    let panel = build_panel(store, &price, &indicator)?;

    let combos = expand_combinations(&request.parameter_ranges);

    let run_one = |(index, assignment): (usize, &Vec<AppliedParam>)| -> VariantRecord {
        if cancel.load(Ordering::Relaxed) {
            let err = RunError::Cancelled;
            return VariantRecord {
                index,
                params: assignment.clone(),
                fingerprint: String::new(),
                result: None,
                error: Some(ErrorEnvelope::from(&err)),
            };
        }

        let tree = apply_assignment(&request.tree, &request.parameter_ranges, assignment);
        let fp = fingerprint(&tree, request.cost_bps);
        let outcome = tree
            .validate()
            .map_err(RunError::from)
            .and_then(|_| {
                run_backtest_on_panel(&tree, &panel, cache, request.cost_bps, &request.split)
            });
        match outcome {
            Ok(result) => VariantRecord {
                index,
                params: assignment.clone(),
                fingerprint: fp,
                result: Some(result),
                error: None,
            },
            Err(err) => VariantRecord {
                index,
                params: assignment.clone(),
                fingerprint: fp,
                result: None,
                error: Some(ErrorEnvelope::from(&err)),
            },
        }
    };

    // collect() preserves input order under par_iter, so no reordering pass
    // is needed afterwards.
    let variants: Vec<VariantRecord> = if options.parallel {
        combos.par_iter().enumerate().map(run_one).collect()
    } else {
        combos.iter().enumerate().map(run_one).collect()
    };

    let mut summary = SweepSummary {
        total: variants.len(),
        ..Default::default()
    };
    for variant in &variants {
        match &variant.error {
            None => summary.succeeded += 1,
            Some(envelope) => {
                *summary.failures.entry(envelope.error_kind.clone()).or_insert(0) += 1;
            }
        }
    }

    Ok(SweepReport { variants, summary })
}
