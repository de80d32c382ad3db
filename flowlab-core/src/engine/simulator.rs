//! Day-by-day portfolio simulation.
//!
//! Walks the aligned panel chronologically, asking the evaluator for a
//! target allocation at every bar, rebalancing when the target changes, and
//! marking holdings to market at the close. Bar i+1 depends on bar i through
//! `holdings` and the previous allocation, so a single variant is strictly
//! sequential; parallelism lives across variants, never inside one.
//!
//! Cost model: a flat proportional haircut of `cost_bps` basis points
//! applied to every target value on every rebalance — per rebalance, not
//! per ticker.

use std::collections::{BTreeMap, HashMap};

use crate::cache::IndicatorCache;
use crate::data::PricePanel;
use crate::domain::Allocation;
use crate::eval::{evaluate, EvalContext, EvalError, SeriesMemo};
use crate::strategy::node::FlowNode;

/// Every simulation starts from the same notional equity.
pub const STARTING_EQUITY: f64 = 10_000.0;

/// Everything one simulation produces.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// Equity after each bar, aligned with the panel's dates.
    pub equities: Vec<f64>,
    /// Target allocation at each bar, in bar order.
    pub allocations: Vec<Allocation>,
    /// Final gate state, keyed by node id (one entry per altExit node that
    /// was evaluated).
    pub node_state: HashMap<String, bool>,
}

/// Run one strategy over one panel.
pub fn simulate(
    tree: &FlowNode,
    panel: &PricePanel,
    cache: &IndicatorCache,
    cost_bps: f64,
) -> Result<SimulationOutput, EvalError> {
    let bars = panel.len();
    let cost_multiplier = 1.0 - cost_bps / 10_000.0;

    let mut equity = STARTING_EQUITY;
    let mut holdings: BTreeMap<String, f64> = BTreeMap::new();
    let mut prev_alloc = Allocation::new();

    let mut memo = SeriesMemo::new();
    let mut state: HashMap<String, bool> = HashMap::new();

    let mut equities = Vec::with_capacity(bars);
    let mut allocations = Vec::with_capacity(bars);

    for bar in 0..bars {
        let alloc = {
            let mut ctx = EvalContext {
                panel,
                bar,
                cache,
                memo: &mut memo,
                state: &mut state,
            };
            evaluate(tree, &mut ctx)?
        };

        // Mark current holdings to market at this bar's close.
        let mut portfolio_value = 0.0;
        for (ticker, shares) in &holdings {
            if let Some(close) = panel.close(ticker) {
                if close[bar].is_finite() {
                    portfolio_value += shares * close[bar];
                }
            }
        }
        // On the first bar (and whenever flat) the starting equity carries.
        let current_value = if holdings.is_empty() || portfolio_value <= 0.0 {
            equity
        } else {
            portfolio_value
        };

        // Rebalance only when the target changed; iteration over the
        // allocation is in sorted ticker order, pinning fp rounding.
        if alloc != prev_alloc {
            let mut new_holdings = BTreeMap::new();
            for (ticker, weight) in alloc.iter() {
                if let Some(close) = panel.close(ticker) {
                    let price = close[bar];
                    if price.is_finite() && price > 0.0 {
                        let target_value = current_value * weight * cost_multiplier;
                        new_holdings.insert(ticker.to_string(), target_value / price);
                    }
                }
            }
            holdings = new_holdings;
            prev_alloc = alloc.clone();
        }

        // Recompute equity from the (possibly new) holdings.
        let mut final_value = 0.0;
        for (ticker, shares) in &holdings {
            if let Some(close) = panel.close(ticker) {
                if close[bar].is_finite() {
                    final_value += shares * close[bar];
                }
            }
        }
        equity = if holdings.is_empty() {
            current_value
        } else {
            final_value
        };

        equities.push(equity);
        allocations.push(alloc);
    }

    Ok(SimulationOutput {
        equities,
        allocations,
        node_state: state,
    })
}
