//! Backtest runner — wires config, data, strategy and kernel together.
//!
//! Two entry points:
//! - `run_backtest()`: loads the CSV named by the config, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded data, no I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use weightsim_core::domain::Portfolio;
use weightsim_core::{DayReport, KernelError, Simulation, SimulationError};

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::{load_days, LoadError, LoadOptions, LoadedData};
use crate::metrics::PerformanceMetrics;
use crate::strategies::build_strategy;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("simulation aborted: {0}")]
    Simulation(#[from] SimulationError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Headline numbers for a finished run; persisted as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub name: String,
    pub strategy: String,
    pub start_date: String,
    pub end_date: String,
    pub days: usize,
    pub symbols: usize,
    pub dataset_hash: String,
    pub seed: u64,
    pub initial_equity: f64,
    pub final_equity: f64,
    pub metrics: PerformanceMetrics,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Complete result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub summary: RunSummary,
    pub config: RunConfig,
    pub days: Vec<DayReport>,
    pub final_portfolio: Portfolio,
}

impl BacktestResult {
    pub fn equity_curve(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.equity).collect()
    }
}

/// Load the config's data and run it.
pub fn run_backtest(config: &RunConfig) -> Result<BacktestResult, RunError> {
    let opts = LoadOptions {
        start: config.run.start,
        end: config.run.end,
        universe: config.run.universe.clone(),
    };
    let loaded = load_days(&config.run.data, &opts)?;
    run_backtest_from_data(config, &loaded)
}

/// Run a config against pre-loaded data.
pub fn run_backtest_from_data(
    config: &RunConfig,
    data: &LoadedData,
) -> Result<BacktestResult, RunError> {
    let run_id = config.run_id()?;
    let simulation = Simulation::new(config.kernel.clone())?;
    let mut strategy = build_strategy(&config.strategy);

    tracing::info!(
        run = %config.run.name,
        run_id = &run_id[..12],
        strategy = strategy.name(),
        days = data.days.len(),
        "run started"
    );

    let initial = simulation.initial_portfolio(config.run.initial_cash);
    let outcome = simulation.run(initial, &data.days, strategy.as_mut())?;
    let metrics = PerformanceMetrics::compute(&outcome, config.run.initial_cash);

    let summary = RunSummary {
        schema_version: SCHEMA_VERSION,
        run_id,
        name: config.run.name.clone(),
        strategy: config.strategy.name().to_string(),
        start_date: data.first_date().map(|d| d.to_string()).unwrap_or_default(),
        end_date: data.last_date().map(|d| d.to_string()).unwrap_or_default(),
        days: outcome.days.len(),
        symbols: data.symbols.len(),
        dataset_hash: data.dataset_hash.clone(),
        seed: config.kernel.seed,
        initial_equity: config.run.initial_cash,
        final_equity: outcome.final_equity(),
        metrics,
    };

    tracing::info!(
        run = %summary.name,
        final_equity = summary.final_equity,
        total_return = summary.metrics.total_return,
        rejected = summary.metrics.rejected,
        "run finished"
    );

    Ok(BacktestResult {
        summary,
        config: config.clone(),
        days: outcome.days,
        final_portfolio: outcome.portfolio,
    })
}
