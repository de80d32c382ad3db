//! The flowchart tree data model.
//!
//! Nodes are a tagged sum over `kind`, carried by a common envelope with the
//! stable identity, child-weighting policy, and named child slots. The wire
//! format is the flowchart JSON (camelCase, kind-specific fields flattened
//! onto the node object).
//!
//! Trees are immutable during a simulation; the sweep coordinator clones and
//! rewrites condition fields to mint variants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::indicators::{IndicatorError, MetricId};

/// Slot name for quantifier ladders: `ladder-<n_true>`.
pub fn ladder_slot(n_true: usize) -> String {
    format!("ladder-{n_true}")
}

/// Loading-time tree errors.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("malformed strategy tree: {0}")]
    Malformed(String),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// How a node combines its children's allocations.
///
/// Only `equal` is implemented; the others are declared by the data model
/// and fall back to the first non-empty child at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Weighting {
    #[default]
    Equal,
    Defined,
    Inverse,
    Pro,
    Capped,
}

/// Boolean composition tag on a condition line. AND binds tighter than OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Compose {
    #[default]
    If,
    And,
    Or,
}

/// Condition comparator.
///
/// `crossAbove`/`crossBelow` use the simplified current-bar comparison
/// (plain `>`/`<` at the evaluation bar), not a two-bar sign change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    Gt,
    #[default]
    Lt,
    CrossAbove,
    CrossBelow,
}

/// Ranking direction for function nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rank {
    Top,
    #[default]
    Bottom,
}

/// Quantifier over a numbered node's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Quantifier {
    Any,
    #[default]
    All,
    None,
    Exactly,
    AtLeast,
    AtMost,
    Ladder,
}

/// One predicate line inside an indicator/altExit/numbered node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Stable identity, targeted by sweep parameter ranges.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub compose: Compose,
    pub ticker: String,
    pub metric: MetricId,
    pub window: usize,
    #[serde(default)]
    pub comparator: Comparator,
    #[serde(default)]
    pub threshold: f64,
    /// When set, the right side is `(right_ticker, right_metric,
    /// right_window)` instead of the numeric threshold.
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub right_ticker: Option<String>,
    #[serde(default)]
    pub right_metric: Option<MetricId>,
    #[serde(default)]
    pub right_window: Option<usize>,
}

/// One item of a numbered node: its own condition list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberedItem {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

fn default_pick_n() -> usize {
    1
}

/// Kind-specific node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeKind {
    /// Leaf: equal-weight allocation over `positions`.
    Position {
        #[serde(default)]
        positions: Vec<String>,
    },
    /// Pass-through to the `next` slot.
    Basic,
    /// Conditional branch: conditions → `then` / `else`.
    Indicator {
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    /// Rank children in `next` by the average of `metric` over each child's
    /// reachable position tickers; forward the first `pick_n`.
    Function {
        metric: MetricId,
        window: usize,
        #[serde(default)]
        rank: Rank,
        #[serde(default = "default_pick_n")]
        pick_n: usize,
    },
    /// Linear blend of `then` and `else` driven by a gauge metric.
    Scaling {
        scale_ticker: String,
        scale_metric: MetricId,
        scale_window: usize,
        scale_from: f64,
        scale_to: f64,
    },
    /// Stateful entry/exit gate; state keyed by node id across bars.
    AltExit {
        #[serde(default)]
        entry_conditions: Vec<Condition>,
        #[serde(default)]
        exit_conditions: Vec<Condition>,
    },
    /// Quantifier block over independent condition items.
    Numbered {
        #[serde(default)]
        items: Vec<NumberedItem>,
        #[serde(default)]
        quantifier: Quantifier,
        #[serde(default)]
        n: usize,
    },
}

/// A strategy tree node: common envelope plus kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    #[serde(default)]
    pub weighting: Weighting,
    #[serde(default)]
    pub children: BTreeMap<String, Vec<FlowNode>>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl FlowNode {
    /// Parse a tree from the flowchart JSON wire format.
    ///
    /// Unknown node kinds and unknown indicator names fail here, before any
    /// simulation starts.
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        let node: FlowNode =
            serde_json::from_str(json).map_err(|e| TreeError::Malformed(e.to_string()))?;
        node.validate()?;
        Ok(node)
    }

    /// Children in a named slot, empty when the slot is absent.
    pub fn slot(&self, name: &str) -> &[FlowNode] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Structural validation: every window positive where one is required.
    pub fn validate(&self) -> Result<(), TreeError> {
        fn check_condition(cond: &Condition, node_id: &str) -> Result<(), TreeError> {
            if cond.metric.uses_window() && cond.window == 0 {
                return Err(TreeError::Malformed(format!(
                    "condition on node '{node_id}' has zero window"
                )));
            }
            if cond.expanded {
                let metric = cond.right_metric.unwrap_or(cond.metric);
                if metric.uses_window() && cond.right_window.unwrap_or(cond.window) == 0 {
                    return Err(TreeError::Malformed(format!(
                        "expanded condition on node '{node_id}' has zero right window"
                    )));
                }
            }
            Ok(())
        }

        match &self.kind {
            NodeKind::Indicator { conditions } => {
                for cond in conditions {
                    check_condition(cond, &self.id)?;
                }
            }
            NodeKind::Function { metric, window, pick_n, .. } => {
                if metric.uses_window() && *window == 0 {
                    return Err(TreeError::Malformed(format!(
                        "function node '{}' has zero window",
                        self.id
                    )));
                }
                if *pick_n == 0 {
                    return Err(TreeError::Malformed(format!(
                        "function node '{}' picks zero children",
                        self.id
                    )));
                }
            }
            NodeKind::Scaling { scale_metric, scale_window, .. } => {
                if scale_metric.uses_window() && *scale_window == 0 {
                    return Err(TreeError::Malformed(format!(
                        "scaling node '{}' has zero window",
                        self.id
                    )));
                }
            }
            NodeKind::AltExit { entry_conditions, exit_conditions } => {
                for cond in entry_conditions.iter().chain(exit_conditions) {
                    check_condition(cond, &self.id)?;
                }
            }
            NodeKind::Numbered { items, .. } => {
                for item in items {
                    for cond in &item.conditions {
                        check_condition(cond, &self.id)?;
                    }
                }
            }
            NodeKind::Position { .. } | NodeKind::Basic => {}
        }

        for children in self.children.values() {
            for child in children {
                child.validate()?;
            }
        }
        Ok(())
    }
}
