//! WeightSim CLI — run backtests and check market data files.
//!
//! Commands:
//! - `run` — execute a backtest from a TOML config file and save artifacts
//! - `check-data` — load and validate a price CSV, report what it covers

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weightsim_runner::{
    load_days, run_backtest, save_artifacts, BacktestResult, LoadOptions, RunConfig,
};

#[derive(Parser)]
#[command(
    name = "weightsim",
    about = "WeightSim CLI — daily target-weight backtest simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Override the config's output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the summary as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load a price CSV and report days, symbols and date range.
    CheckData {
        /// Long-format CSV: date,symbol,open,high,low,close,volume[,dividend,delisting_date].
        #[arg(long)]
        data: PathBuf,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            json,
        } => run_cmd(config, output_dir, json),
        Commands::CheckData { data, start, end } => check_data_cmd(data, start, end),
    }
}

fn run_cmd(config_path: PathBuf, output_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let config = RunConfig::load(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let result = run_backtest(&config)
        .with_context(|| format!("run '{}' failed", config.run.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.summary)?);
    } else {
        print_summary(&result);
    }

    let output_dir = output_dir.unwrap_or_else(|| config.run.output_dir.clone());
    let run_dir = save_artifacts(&result, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    Ok(())
}

fn check_data_cmd(data: PathBuf, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    let opts = LoadOptions {
        start,
        end,
        universe: Vec::new(),
    };
    let loaded = load_days(&data, &opts)
        .with_context(|| format!("failed to load {}", data.display()))?;

    println!("File:       {}", data.display());
    println!("Days:       {}", loaded.days.len());
    println!("Symbols:    {}", loaded.symbols.len());
    println!("Bars:       {}", loaded.bar_count());
    if let (Some(first), Some(last)) = (loaded.first_date(), loaded.last_date()) {
        println!("Period:     {first} to {last}");
    }
    println!("Hash:       {}", loaded.dataset_hash);
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let s = &result.summary;
    let m = &s.metrics;
    println!();
    println!("=== Backtest Result ===");
    let short_id = s.run_id.get(..12).unwrap_or(&s.run_id);
    println!("Run:            {} ({short_id})", s.name);
    println!("Strategy:       {}", s.strategy);
    println!("Period:         {} to {}", s.start_date, s.end_date);
    println!("Days:           {}", s.days);
    println!("Symbols:        {}", s.symbols);
    println!("Seed:           {}", s.seed);
    println!();
    println!("--- Activity ---");
    println!("Fills:          {}", m.fills);
    println!("Skipped:        {}", m.skipped);
    println!("Clamped:        {}", m.clamped);
    println!("Rejected:       {}", m.rejected);
    println!("Commission:     {:.2}", m.total_commission);
    println!("Slippage:       {:.2}", m.total_slippage);
    println!();
    println!("--- Performance ---");
    println!("Initial Equity: {:.2}", s.initial_equity);
    println!("Final Equity:   {:.2}", s.final_equity);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("CAGR:           {:.2}%", m.cagr * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Realized PnL:   {:.2}", m.realized_pnl);
    println!("Dividends:      {:.2}", m.total_dividends);
    if m.rejected > 0 {
        println!();
        println!("WARNING: {} fills were rejected by the ledger", m.rejected);
    }
    println!();
}
