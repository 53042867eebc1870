//! WeightSim Runner — everything around the kernel needed for a real run.
//!
//! This crate builds on `weightsim-core` to provide:
//! - TOML run configuration with content-addressed run IDs
//! - CSV market data loading and validation
//! - Built-in strategies
//! - Performance metrics and artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod strategies;

pub use config::{ConfigError, RunConfig, RunId, RunSection, StrategyConfig};
pub use data_loader::{load_days, read_days, LoadError, LoadOptions, LoadedData};
pub use export::save_artifacts;
pub use metrics::PerformanceMetrics;
pub use runner::{run_backtest, run_backtest_from_data, BacktestResult, RunError, RunSummary};
pub use strategies::{build_strategy, BuyAndHold, EqualWeight, TopVolumeLimit};
