//! End-to-end backtest scenarios over engineered synthetic panels.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use flowlab_core::cache::IndicatorCache;
use flowlab_core::data::MemoryBarStore;
use flowlab_core::indicators::{oscillators, MetricId};
use flowlab_core::strategy::node::{
    Comparator, Compose, Condition, FlowNode, NodeKind, Quantifier, Rank, Weighting,
};
use flowlab_core::synthetic::bars_from_closes;
use flowlab_runner::{run_backtest, BacktestRequest, RunError, SplitConfig};

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 3).unwrap()
}

fn position(id: &str, tickers: &[&str]) -> FlowNode {
    FlowNode {
        id: id.to_string(),
        weighting: Weighting::Equal,
        children: BTreeMap::new(),
        kind: NodeKind::Position {
            positions: tickers.iter().map(|t| t.to_string()).collect(),
        },
    }
}

fn rsi_condition(ticker: &str, window: usize, comparator: Comparator, threshold: f64) -> Condition {
    Condition {
        id: Some("c1".to_string()),
        compose: Compose::If,
        ticker: ticker.to_string(),
        metric: MetricId::Rsi,
        window,
        comparator,
        threshold,
        expanded: false,
        right_ticker: None,
        right_metric: None,
        right_window: None,
    }
}

fn gate(conditions: Vec<Condition>, then: Vec<FlowNode>, otherwise: Vec<FlowNode>) -> FlowNode {
    let mut children = BTreeMap::new();
    children.insert("then".to_string(), then);
    children.insert("else".to_string(), otherwise);
    FlowNode {
        id: "root".to_string(),
        weighting: Weighting::Equal,
        children,
        kind: NodeKind::Indicator { conditions },
    }
}

// ── Scenario: single-ticker buy and hold ────────────────────────────

#[test]
fn buy_and_hold_equity_tracks_price() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 101.0, 102.0, 103.0, 104.0]),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: position("root", &["SPY"]),
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();

    let expected = [10_000.0, 10_100.0, 10_200.0, 10_300.0, 10_400.0];
    assert_eq!(result.equity_curve.len(), 5);
    for ((_, equity), expected) in result.equity_curve.iter().zip(expected) {
        assert!((equity - expected).abs() < 1e-9, "{equity} != {expected}");
    }

    assert!(result.metrics.cagr > 0.0);
    assert_eq!(result.metrics.max_drawdown, 0.0);
    assert!((result.metrics.tim - 1.0).abs() < 1e-12);
    // Timestamps are integral unix seconds at midnight, strictly increasing.
    assert!(result.equity_curve.windows(2).all(|w| w[1].0 > w[0].0));
    assert!(result.equity_curve.iter().all(|(ts, _)| ts % 86_400 == 0));
}

// ── Scenario: RSI(2) < 30 gate with costs ───────────────────────────

/// Closes engineered so RSI(2) dips below 30 on exactly bars 4 and 7.
const RSI2_CLOSES: [f64; 10] = [
    100.0, 101.0, 102.0, 101.0, 96.0, 104.0, 105.0, 95.0, 104.0, 105.0,
];

#[test]
fn rsi2_closes_fixture_dips_on_bars_4_and_7() {
    let series = oscillators::rsi(&RSI2_CLOSES, 2);
    let below: Vec<usize> = series
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && **v < 30.0)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(below, vec![4, 7], "fixture drifted: {series:?}");
}

#[test]
fn rsi2_gate_invests_on_dips_only() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &RSI2_CLOSES),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: gate(
            vec![rsi_condition("SPY", 2, Comparator::Lt, 30.0)],
            vec![position("in", &["SPY"])],
            vec![position("out", &[])],
        ),
        cost_bps: 5.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();

    let invested: Vec<usize> = result
        .allocations
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_empty())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(invested, vec![4, 7]);
    assert!((result.metrics.tim - 0.2).abs() < 1e-12);

    // The gate enters the market exactly twice.
    let entries = result
        .allocations
        .windows(2)
        .filter(|pair| pair[0].is_empty() && !pair[1].is_empty())
        .count()
        + usize::from(!result.allocations[0].is_empty());
    assert_eq!(entries, 2);

    // Both invested bars were followed by an up day: dip-buys at 96 → 104
    // and 95 → 104.
    assert!((result.metrics.win_rate - 1.0).abs() < 1e-12);

    // Entry cost shows up: equity after the first dip-buy is below the
    // frictionless path.
    let frictionless = 10_000.0 * 104.0 / 96.0;
    let (_, equity_after_first_trade) = result.equity_curve[5];
    assert!(equity_after_first_trade < frictionless);
}

// ── Scenario: function node picks the lowest RSI ────────────────────

#[test]
fn function_node_routes_to_lowest_rsi_child() {
    // AAA drifts, BBB falls hard (lowest RSI), CCC rallies.
    let n = 30;
    let aaa: Vec<f64> = (0..n)
        .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
        .collect();
    let bbb: Vec<f64> = (0..n).map(|i| 100.0 - i as f64).collect();
    let ccc: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();

    let store = MemoryBarStore::new()
        .with("AAA", bars_from_closes("AAA", start_date(), &aaa))
        .with("BBB", bars_from_closes("BBB", start_date(), &bbb))
        .with("CCC", bars_from_closes("CCC", start_date(), &ccc))
        .with("SPY", bars_from_closes("SPY", start_date(), &vec![100.0; n]));

    let mut children = BTreeMap::new();
    children.insert(
        "next".to_string(),
        vec![
            position("a", &["AAA"]),
            position("b", &["BBB"]),
            position("c", &["CCC"]),
        ],
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: FlowNode {
            id: "rank".to_string(),
            weighting: Weighting::Equal,
            children,
            kind: NodeKind::Function {
                metric: MetricId::Rsi,
                window: 14,
                rank: Rank::Bottom,
                pick_n: 1,
            },
        },
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();

    // Once RSI warms up, the falling ticker owns the whole allocation.
    let last = result.allocations.last().unwrap();
    assert_eq!(last.weight("BBB"), Some(1.0));
    assert_eq!(last.len(), 1);
}

// ── Scenario: scaling blend endpoints and midpoint ──────────────────

#[test]
fn scaling_blend_walks_from_then_to_else() {
    // Gauge = Current Price of SPY stepping 100 → 110 → 120 over the
    // configured 100..120 range.
    let closes = vec![100.0, 100.0, 100.0, 110.0, 120.0];
    let store = MemoryBarStore::new()
        .with("SPY", bars_from_closes("SPY", start_date(), &closes))
        .with("BIL", bars_from_closes("BIL", start_date(), &vec![90.0; 5]));

    let mut children = BTreeMap::new();
    children.insert("then".to_string(), vec![position("t", &["SPY"])]);
    children.insert("else".to_string(), vec![position("e", &["BIL"])]);
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: FlowNode {
            id: "scale".to_string(),
            weighting: Weighting::Equal,
            children,
            kind: NodeKind::Scaling {
                scale_ticker: "SPY".to_string(),
                scale_metric: MetricId::CurrentPrice,
                scale_window: 1,
                scale_from: 100.0,
                scale_to: 120.0,
            },
        },
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();

    // Gauge at `from` → all then.
    assert_eq!(result.allocations[0].weight("SPY"), Some(1.0));
    assert_eq!(result.allocations[0].weight("BIL"), None);
    // Midpoint → 50/50, summing to 1.
    assert_eq!(result.allocations[3].weight("SPY"), Some(0.5));
    assert_eq!(result.allocations[3].weight("BIL"), Some(0.5));
    assert!((result.allocations[3].total() - 1.0).abs() < 1e-9);
    // Gauge at `to` → all else.
    assert_eq!(result.allocations[4].weight("BIL"), Some(1.0));
    assert_eq!(result.allocations[4].weight("SPY"), None);
}

// ── Boundary behaviors ──────────────────────────────────────────────

#[test]
fn three_bar_panel_produces_defined_metrics() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 100.0, 100.0]),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: position("root", &["SPY"]),
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();
    assert_eq!(result.metrics.bar_count, 3);
    assert_eq!(result.metrics.sharpe, 0.0);
    assert_eq!(result.metrics.sortino, 0.0);
    assert!(result.metrics.cagr.is_finite());
}

#[test]
fn two_bar_panel_is_insufficient_data() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 101.0]),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: position("root", &["SPY"]),
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let err = run_backtest(&store, &cache, &request).unwrap_err();
    assert!(matches!(err, RunError::InsufficientData(_)));
    assert_eq!(err.kind(), "insufficient_data");
}

#[test]
fn explicitly_requested_unknown_ticker_is_an_error() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 101.0, 102.0, 103.0]),
    );
    let request = BacktestRequest {
        tickers: vec!["GHOST".to_string()],
        tree: position("root", &["SPY"]),
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let err = run_backtest(&store, &cache, &request).unwrap_err();
    assert!(matches!(err, RunError::UnknownTicker(ref t) if t == "GHOST"));
    assert_eq!(err.kind(), "unknown_ticker");
}

#[test]
fn unknown_ticker_inside_tree_is_tolerated() {
    // Same ticker, but referenced by the tree instead of requested
    // explicitly: it is silently dropped and the branch stays empty.
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 101.0, 102.0, 103.0]),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: position("root", &["GHOST"]),
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();
    // The allocation names GHOST but nothing can be bought: equity is flat.
    assert!(result.equity_curve.iter().all(|(_, e)| *e == 10_000.0));
}

#[test]
fn empty_positions_hold_flat_with_zero_tim() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 90.0, 80.0, 70.0]),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: position("root", &[]),
        cost_bps: 5.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();
    assert!(result.equity_curve.iter().all(|(_, e)| *e == 10_000.0));
    assert_eq!(result.metrics.tim, 0.0);
    assert_eq!(result.metrics.timar, 0.0);
}

#[test]
fn altexit_never_triggered_stays_out() {
    let closes: Vec<f64> = vec![100.0; 10];
    let store =
        MemoryBarStore::new().with("SPY", bars_from_closes("SPY", start_date(), &closes));

    let mut children = BTreeMap::new();
    children.insert("then".to_string(), vec![position("in", &["SPY"])]);
    children.insert("else".to_string(), vec![position("out", &[])]);
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: FlowNode {
            id: "gate".to_string(),
            weighting: Weighting::Equal,
            children,
            kind: NodeKind::AltExit {
                entry_conditions: vec![rsi_condition("SPY", 2, Comparator::Lt, -1.0)],
                exit_conditions: vec![rsi_condition("SPY", 2, Comparator::Gt, 101.0)],
            },
        },
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();
    assert!(result.allocations.iter().all(|a| a.is_empty()));
    assert_eq!(result.metrics.tim, 0.0);
}

#[test]
fn no_split_mirrors_metrics_into_is() {
    let store = MemoryBarStore::new().with(
        "SPY",
        bars_from_closes("SPY", start_date(), &[100.0, 101.0, 102.0, 103.0]),
    );
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: position("root", &["SPY"]),
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();
    assert_eq!(result.is_metrics.as_ref(), Some(&result.metrics));
    assert!(result.oos_metrics.is_none());
}

#[test]
fn numbered_ladder_selects_slot_by_true_count() {
    // Two always-true price conditions → ladder-2 slot.
    let closes: Vec<f64> = vec![100.0; 6];
    let store =
        MemoryBarStore::new().with("SPY", bars_from_closes("SPY", start_date(), &closes));

    let price_cond = |threshold: f64| Condition {
        id: None,
        compose: Compose::If,
        ticker: "SPY".to_string(),
        metric: MetricId::CurrentPrice,
        window: 1,
        comparator: Comparator::Gt,
        threshold,
        expanded: false,
        right_ticker: None,
        right_metric: None,
        right_window: None,
    };
    let items = vec![
        flowlab_core::strategy::node::NumberedItem {
            conditions: vec![price_cond(50.0)],
        },
        flowlab_core::strategy::node::NumberedItem {
            conditions: vec![price_cond(80.0)],
        },
    ];
    let mut children = BTreeMap::new();
    children.insert("ladder-0".to_string(), vec![position("l0", &[])]);
    children.insert("ladder-1".to_string(), vec![position("l1", &[])]);
    children.insert("ladder-2".to_string(), vec![position("l2", &["SPY"])]);
    let request = BacktestRequest {
        tickers: Vec::new(),
        tree: FlowNode {
            id: "ladder".to_string(),
            weighting: Weighting::Equal,
            children,
            kind: NodeKind::Numbered {
                items,
                quantifier: Quantifier::Ladder,
                n: 0,
            },
        },
        cost_bps: 0.0,
        split: SplitConfig::default(),
    };
    let cache = IndicatorCache::default();
    let result = run_backtest(&store, &cache, &request).unwrap();
    assert!(result.allocations.iter().all(|a| a.weight("SPY") == Some(1.0)));
}
