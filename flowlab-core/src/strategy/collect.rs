//! Tree collectors: which tickers and indicator series a tree needs.
//!
//! Used once per backtest to size the panel, and once per sweep to warm the
//! shared indicator cache before variants fan out.

use std::collections::BTreeSet;

use crate::domain::normalize_symbol;
use crate::indicators::MetricId;

use super::node::{Condition, FlowNode, NodeKind};

/// Placeholder used by the flowchart editor for an unset ticker slot.
const EMPTY_SENTINEL: &str = "Empty";

fn push_ticker(out: &mut BTreeSet<String>, raw: &str) {
    let normalized = normalize_symbol(raw);
    if !normalized.is_empty() && normalized != normalize_symbol(EMPTY_SENTINEL) {
        out.insert(normalized);
    }
}

/// Tickers held by `position` leaves reachable from `node`.
pub fn collect_position_tickers(node: &FlowNode) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk(node, &mut |n| {
        if let NodeKind::Position { positions } = &n.kind {
            for ticker in positions {
                push_ticker(&mut out, ticker);
            }
        }
    });
    out
}

/// Tickers referenced by conditions and gauges (the intersection set for
/// panel alignment).
pub fn collect_condition_tickers(node: &FlowNode) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk(node, &mut |n| {
        for cond in node_conditions(n) {
            push_ticker(&mut out, &cond.ticker);
            if cond.expanded {
                if let Some(right) = &cond.right_ticker {
                    push_ticker(&mut out, right);
                }
            }
        }
        if let NodeKind::Scaling { scale_ticker, .. } = &n.kind {
            push_ticker(&mut out, scale_ticker);
        }
    });
    out
}

/// Every `(ticker, metric, window)` series the tree can ask for.
///
/// Function nodes rank over their children's position tickers, so each of
/// those tickers contributes one series under the function's metric.
pub fn collect_indicator_specs(node: &FlowNode) -> BTreeSet<(String, MetricId, usize)> {
    let mut out = BTreeSet::new();
    walk(node, &mut |n| {
        for cond in node_conditions(n) {
            out.insert((normalize_symbol(&cond.ticker), cond.metric, cond.window));
            if cond.expanded {
                if let Some(right) = &cond.right_ticker {
                    out.insert((
                        normalize_symbol(right),
                        cond.right_metric.unwrap_or(cond.metric),
                        cond.right_window.unwrap_or(cond.window),
                    ));
                }
            }
        }
        match &n.kind {
            NodeKind::Scaling { scale_ticker, scale_metric, scale_window, .. } => {
                out.insert((normalize_symbol(scale_ticker), *scale_metric, *scale_window));
            }
            NodeKind::Function { metric, window, .. } => {
                for children in n.children.values() {
                    for child in children {
                        for ticker in collect_position_tickers(child) {
                            out.insert((ticker, *metric, *window));
                        }
                    }
                }
            }
            _ => {}
        }
    });
    out
}

fn node_conditions(node: &FlowNode) -> Vec<&Condition> {
    match &node.kind {
        NodeKind::Indicator { conditions } => conditions.iter().collect(),
        NodeKind::AltExit { entry_conditions, exit_conditions } => {
            entry_conditions.iter().chain(exit_conditions).collect()
        }
        NodeKind::Numbered { items, .. } => {
            items.iter().flat_map(|item| item.conditions.iter()).collect()
        }
        _ => Vec::new(),
    }
}

fn walk<'a>(node: &'a FlowNode, visit: &mut impl FnMut(&'a FlowNode)) {
    visit(node);
    for children in node.children.values() {
        for child in children {
            walk(child, visit);
        }
    }
}
