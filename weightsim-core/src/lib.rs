//! WeightSim Core — the day-by-day simulation kernel.
//!
//! This crate turns a strategy's target weights into trades and portfolio state:
//! - Domain types (bars, trading days, orders, fills, positions, portfolio)
//! - Order generator: target weights and order specs to orders
//! - Execution engine: MARKET/LIMIT matching with slippage, commission and
//!   liquidity limits
//! - Portfolio ledger: sells-first fill booking, cash clamping, dividends and
//!   mark-to-market
//! - Day loop composing the three over a trading calendar
//! - Keyed slippage streams so seeded runs replay bit-for-bit

pub mod domain;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod orders;
pub mod rng;
pub mod settings;
pub mod simulation;

pub use error::KernelError;
pub use settings::KernelSettings;
pub use simulation::{
    DayContext, DayReport, RunOutcome, Simulation, SimulationError, Strategy, StrategyOutput,
};
