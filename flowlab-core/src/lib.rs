//! FlowLab Core — evaluation engine for flowchart trading strategies.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, symbols, allocations)
//! - Read-only bar store over per-ticker Parquet files
//! - Price panel builder (date alignment, fills, trimming)
//! - Indicator library of pure functions with a sweep-wide memo cache
//! - Strategy tree model and the recursive evaluator
//! - Day-by-day portfolio simulator
//!
//! Orchestration (metrics, IS/OOS splitting, parameter sweeps) lives in
//! `flowlab-runner`.

pub mod cache;
pub mod data;
pub mod domain;
pub mod engine;
pub mod eval;
pub mod indicators;
pub mod strategy;
pub mod synthetic;
