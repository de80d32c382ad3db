//! Simulation engine: the chronological bar loop.

pub mod simulator;

pub use simulator::{simulate, SimulationOutput, STARTING_EQUITY};
