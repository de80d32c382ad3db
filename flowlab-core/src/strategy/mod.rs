//! Strategy tree: the flowchart data model and its collectors.

pub mod collect;
pub mod node;

pub use collect::{collect_condition_tickers, collect_indicator_specs, collect_position_tickers};
pub use node::{
    Comparator, Compose, Condition, FlowNode, NodeKind, NumberedItem, Quantifier, Rank, TreeError,
    Weighting,
};
