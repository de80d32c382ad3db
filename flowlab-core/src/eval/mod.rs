//! Tree evaluator: `allocation = eval(node, ctx)` at one bar.
//!
//! Missing indicator data is never fatal here — a condition with a NaN input
//! evaluates false and an unevaluable branch collapses to an empty
//! allocation. The only errors that escape are structural (an invalid
//! window reaching the indicator layer).
//!
//! Determinism: children are evaluated in declared order and allocations
//! merge through `Allocation`'s sorted-ticker iteration, so repeated runs
//! reproduce the same floating-point results bit for bit.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheKey, IndicatorCache};
use crate::data::PricePanel;
use crate::domain::{normalize_symbol, Allocation};
use crate::indicators::{self, IndicatorError, MetricId};
use crate::strategy::node::{
    ladder_slot, Comparator, Compose, Condition, FlowNode, NodeKind, Quantifier, Rank, Weighting,
};

/// Errors that abort a variant's evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// Per-simulation memo above the shared cache.
///
/// Holds `Arc` clones of every series this simulation has touched, so the
/// per-bar hot path is a plain `HashMap` probe instead of a `RwLock`
/// acquisition. Lives exactly as long as one simulation.
#[derive(Default)]
pub struct SeriesMemo {
    series: HashMap<CacheKey, Arc<Vec<f64>>>,
}

impl SeriesMemo {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything a node needs at one bar.
pub struct EvalContext<'a> {
    pub panel: &'a PricePanel,
    pub bar: usize,
    pub cache: &'a IndicatorCache,
    pub memo: &'a mut SeriesMemo,
    /// Gate state keyed by node id; persists across bars of one simulation.
    pub state: &'a mut HashMap<String, bool>,
}

impl<'a> EvalContext<'a> {
    /// Metric value for `ticker` at the current bar.
    ///
    /// `None` for tickers absent from the panel and NaN warm-up positions;
    /// both are "missing data" to the condition layer.
    pub fn metric_at(
        &mut self,
        ticker: &str,
        metric: MetricId,
        window: usize,
    ) -> Result<Option<f64>, EvalError> {
        let ticker = normalize_symbol(ticker);
        if !self.panel.contains(&ticker) {
            return Ok(None);
        }

        let key: CacheKey = (ticker, metric, window);
        let memoized = self.memo.series.get(&key).cloned();
        let series = match memoized {
            Some(series) => series,
            None => {
                let panel = self.panel;
                let symbol = key.0.clone();
                let series = self.cache.get_or_compute(key.clone(), || {
                    let view = panel
                        .series(&symbol)
                        .expect("ticker presence checked above");
                    indicators::compute(metric, &view, window)
                })?;
                self.memo.series.insert(key, Arc::clone(&series));
                series
            }
        };

        let value = series.get(self.bar).copied().unwrap_or(f64::NAN);
        Ok(if value.is_finite() { Some(value) } else { None })
    }
}

/// Evaluate a tree at the context's bar, producing a target allocation.
pub fn evaluate(node: &FlowNode, ctx: &mut EvalContext<'_>) -> Result<Allocation, EvalError> {
    match &node.kind {
        NodeKind::Position { positions } => Ok(eval_position(positions)),

        NodeKind::Basic => combine_slot(node, "next", ctx),

        NodeKind::Indicator { conditions } => {
            let branch = if eval_condition_list(conditions, ctx)? {
                "then"
            } else {
                "else"
            };
            combine_slot(node, branch, ctx)
        }

        NodeKind::Function { metric, window, rank, pick_n } => {
            eval_function(node, *metric, *window, *rank, *pick_n, ctx)
        }

        NodeKind::Scaling {
            scale_ticker,
            scale_metric,
            scale_window,
            scale_from,
            scale_to,
        } => {
            let gauge = ctx.metric_at(scale_ticker, *scale_metric, *scale_window)?;
            let blend = blend_factor(gauge, *scale_from, *scale_to);
            let then_alloc = combine_slot(node, "then", ctx)?;
            let else_alloc = combine_slot(node, "else", ctx)?;
            Ok(blend_allocations(&then_alloc, &else_alloc, blend))
        }

        NodeKind::AltExit { entry_conditions, exit_conditions } => {
            let entered = ctx.state.get(&node.id).copied().unwrap_or(false);
            let entry_met = !entry_conditions.is_empty()
                && eval_condition_list(entry_conditions, ctx)?;
            let exit_met =
                !exit_conditions.is_empty() && eval_condition_list(exit_conditions, ctx)?;

            let next = if !entered && entry_met {
                true
            } else if entered && exit_met {
                false
            } else {
                entered
            };
            ctx.state.insert(node.id.clone(), next);

            combine_slot(node, if next { "then" } else { "else" }, ctx)
        }

        NodeKind::Numbered { items, quantifier, n } => {
            let mut n_true = 0usize;
            for item in items {
                if !item.conditions.is_empty() && eval_condition_list(&item.conditions, ctx)? {
                    n_true += 1;
                }
            }

            if *quantifier == Quantifier::Ladder {
                return combine_slot(node, &ladder_slot(n_true), ctx);
            }

            let ok = match quantifier {
                Quantifier::Any => n_true >= 1,
                Quantifier::All => n_true == items.len(),
                Quantifier::None => n_true == 0,
                Quantifier::Exactly => n_true == *n,
                Quantifier::AtLeast => n_true >= *n,
                Quantifier::AtMost => n_true <= *n,
                Quantifier::Ladder => unreachable!("handled above"),
            };
            combine_slot(node, if ok { "then" } else { "else" }, ctx)
        }
    }
}

// ── Node-kind helpers ───────────────────────────────────────────────

fn eval_position(positions: &[String]) -> Allocation {
    let valid: Vec<String> = positions
        .iter()
        .map(|p| normalize_symbol(p))
        .filter(|p| !p.is_empty() && p != "EMPTY")
        .collect();
    if valid.is_empty() {
        return Allocation::new();
    }
    let weight = 1.0 / valid.len() as f64;
    let mut alloc = Allocation::new();
    for ticker in &valid {
        alloc.add(ticker, weight);
    }
    alloc
}

fn eval_function(
    node: &FlowNode,
    metric: MetricId,
    window: usize,
    rank: Rank,
    pick_n: usize,
    ctx: &mut EvalContext<'_>,
) -> Result<Allocation, EvalError> {
    // Score each candidate child by the average metric over its reachable
    // position tickers; children with no evaluable ticker drop out.
    let mut scored: Vec<(usize, f64)> = Vec::new();
    for (index, child) in node.slot("next").iter().enumerate() {
        let tickers = crate::strategy::collect::collect_position_tickers(child);
        let mut values = Vec::new();
        for ticker in &tickers {
            if let Some(value) = ctx.metric_at(ticker, metric, window)? {
                values.push(value);
            }
        }
        if !values.is_empty() {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            scored.push((index, avg));
        }
    }

    // Stable sort keeps declared order on ties.
    match rank {
        Rank::Bottom => scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        }),
        Rank::Top => scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        }),
    }

    let children = node.slot("next");
    let picked: Vec<&FlowNode> = scored
        .iter()
        .take(pick_n)
        .map(|(index, _)| &children[*index])
        .collect();
    combine(node.weighting, &picked, ctx)
}

/// Blend factor in [0, 1]: 0 at `from`, 1 at `to`, mirrored when from > to.
///
/// Missing gauge or a degenerate range (from == to) pins the blend to the
/// `then` branch.
fn blend_factor(gauge: Option<f64>, from: f64, to: f64) -> f64 {
    let Some(value) = gauge else {
        return 0.0;
    };
    if from == to {
        return 0.0;
    }
    if from < to {
        ((value - from) / (to - from)).clamp(0.0, 1.0)
    } else {
        ((from - value) / (from - to)).clamp(0.0, 1.0)
    }
}

/// `(1−b)·then + b·else`, ticker-wise.
fn blend_allocations(then_alloc: &Allocation, else_alloc: &Allocation, blend: f64) -> Allocation {
    let mut out = Allocation::new();
    for (ticker, weight) in then_alloc.iter() {
        let scaled = weight * (1.0 - blend);
        if scaled != 0.0 {
            out.add(ticker, scaled);
        }
    }
    for (ticker, weight) in else_alloc.iter() {
        let scaled = weight * blend;
        if scaled != 0.0 {
            out.add(ticker, scaled);
        }
    }
    out
}

fn combine_slot(
    node: &FlowNode,
    slot: &str,
    ctx: &mut EvalContext<'_>,
) -> Result<Allocation, EvalError> {
    let children: Vec<&FlowNode> = node.slot(slot).iter().collect();
    combine(node.weighting, &children, ctx)
}

/// Merge child allocations under the parent's weighting policy.
///
/// `equal` averages the non-empty child results uniformly. The reserved
/// policies are not implemented and fall back to the first non-empty child.
fn combine(
    weighting: Weighting,
    children: &[&FlowNode],
    ctx: &mut EvalContext<'_>,
) -> Result<Allocation, EvalError> {
    let mut child_allocs = Vec::new();
    for child in children {
        let alloc = evaluate(child, ctx)?;
        if !alloc.is_empty() {
            child_allocs.push(alloc);
        }
    }
    if child_allocs.is_empty() {
        return Ok(Allocation::new());
    }

    match weighting {
        Weighting::Equal => {
            let share = 1.0 / child_allocs.len() as f64;
            let mut merged = Allocation::new();
            for alloc in &child_allocs {
                for (ticker, weight) in alloc.iter() {
                    merged.add(ticker, weight * share);
                }
            }
            Ok(merged)
        }
        _ => Ok(child_allocs.into_iter().next().expect("non-empty checked")),
    }
}

// ── Condition evaluation ────────────────────────────────────────────

/// Evaluate one condition; `None` means missing data.
fn eval_condition(cond: &Condition, ctx: &mut EvalContext<'_>) -> Result<Option<bool>, EvalError> {
    let Some(left) = ctx.metric_at(&cond.ticker, cond.metric, cond.window)? else {
        return Ok(None);
    };

    let right = if cond.expanded {
        let ticker = cond.right_ticker.as_deref().unwrap_or(&cond.ticker);
        let metric = cond.right_metric.unwrap_or(cond.metric);
        let window = cond.right_window.unwrap_or(cond.window);
        match ctx.metric_at(ticker, metric, window)? {
            Some(value) => value,
            None => return Ok(None),
        }
    } else {
        cond.threshold
    };

    // crossAbove/crossBelow compare at the current bar only.
    let result = match cond.comparator {
        Comparator::Gt | Comparator::CrossAbove => left > right,
        Comparator::Lt | Comparator::CrossBelow => left < right,
    };
    Ok(Some(result))
}

/// Compose a condition list: AND binds tighter than OR, `if` opens a new
/// AND-group. Any missing datum makes the whole list false.
fn eval_condition_list(
    conditions: &[Condition],
    ctx: &mut EvalContext<'_>,
) -> Result<bool, EvalError> {
    if conditions.is_empty() {
        return Ok(false);
    }

    let mut or_terms: Vec<bool> = Vec::new();
    let mut current_and: Option<bool> = None;

    for cond in conditions {
        let Some(result) = eval_condition(cond, ctx)? else {
            return Ok(false);
        };

        match cond.compose {
            Compose::If => {
                if let Some(term) = current_and.take() {
                    or_terms.push(term);
                }
                current_and = Some(result);
            }
            Compose::And => {
                current_and = Some(current_and.map_or(result, |acc| acc && result));
            }
            Compose::Or => {
                if let Some(term) = current_and.take() {
                    or_terms.push(term);
                }
                current_and = Some(result);
            }
        }
    }

    if let Some(term) = current_and {
        or_terms.push(term);
    }
    Ok(or_terms.into_iter().any(|t| t))
}
