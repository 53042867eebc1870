//! End-to-end runner tests: TOML config + CSV on disk → summary and artifacts.

use std::fmt::Write as _;
use std::path::Path;

use weightsim_runner::export::{import_summary_json, save_artifacts};
use weightsim_runner::{run_backtest, RunConfig, RunError};

/// Three symbols over twenty days with deterministic drifts.
fn write_prices(dir: &Path) {
    let mut csv = String::from("date,symbol,open,high,low,close,volume\n");
    let base = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    for t in 0..20 {
        let date = base + chrono::Duration::days(t);
        for (sym, start, drift, vol) in [
            ("AAA", 50.0, 0.5, 3_000.0),
            ("BBB", 20.0, -0.1, 9_000.0),
            ("CCC", 100.0, 1.0, 1_000.0),
        ] {
            let close: f64 = start + drift * t as f64;
            writeln!(
                csv,
                "{date},{sym},{:.2},{:.2},{:.2},{close:.2},{vol}",
                close - 0.2,
                close + 1.0,
                close - 1.0,
            )
            .unwrap();
        }
    }
    std::fs::write(dir.join("prices.csv"), csv).unwrap();
}

fn write_config(dir: &Path, strategy: &str, kernel: &str) -> std::path::PathBuf {
    let text = format!(
        r#"
[run]
name = "it"
data = "prices.csv"
initial_cash = 100000.0
output_dir = "out"

[kernel]
{kernel}

[strategy]
{strategy}
"#
    );
    let path = dir.join("run.toml");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn equal_weight_run_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_prices(dir.path());
    let cfg_path = write_config(
        dir.path(),
        "type = \"EQUAL_WEIGHT\"\ngross = 0.9",
        "seed = 7\nslippage = { type = \"FIXED_BPS\", bps = 5.0 }",
    );

    let config = RunConfig::load(&cfg_path).unwrap();
    assert_eq!(config.run.data, dir.path().join("prices.csv"));

    let result = run_backtest(&config).unwrap();
    assert_eq!(result.summary.days, 20);
    assert_eq!(result.summary.symbols, 3);
    assert!(result.summary.metrics.fills >= 3);
    assert!(result.summary.metrics.total_slippage > 0.0);
    assert_eq!(result.summary.metrics.rejected, 0);

    let run_dir = save_artifacts(&result, &config.run.output_dir).unwrap();
    assert!(run_dir.starts_with(dir.path().join("out")));
    for file in [
        "fills.csv",
        "skipped.csv",
        "clamped.csv",
        "rejected.csv",
        "equity.csv",
        "summary.json",
    ] {
        assert!(run_dir.join(file).exists(), "{file} missing");
    }

    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    assert_eq!(equity.lines().count(), 21);

    let json = std::fs::read_to_string(run_dir.join("summary.json")).unwrap();
    let summary = import_summary_json(&json).unwrap();
    assert_eq!(summary.run_id, result.summary.run_id);
    assert_eq!(summary.days, 20);
    assert!((summary.final_equity - result.summary.final_equity).abs() < 1e-6);
}

#[test]
fn fully_invested_run_with_friction_keeps_trading() {
    let dir = tempfile::tempdir().unwrap();
    write_prices(dir.path());
    let cfg_path = write_config(
        dir.path(),
        "type = \"EQUAL_WEIGHT\"\ngross = 1.0",
        "seed = 3\nslippage = { type = \"FIXED_BPS\", bps = 10.0 }\n\
         commission = { per_share = 0.01, min_per_order = 1.0 }",
    );
    let config = RunConfig::load(&cfg_path).unwrap();
    let result = run_backtest(&config).unwrap();

    // day one is flat; day two buys a third of equity in each symbol
    let entry = &result.days[1];
    assert_eq!(entry.fills.len(), 3);
    assert!(entry.rejected.is_empty());
    assert_eq!(entry.clamped.len(), 1);
    assert_eq!(entry.clamped[0].fill.symbol, "CCC");
    assert!(result.summary.metrics.clamped > 0);
    assert!(result.days.iter().all(|d| d.cash >= 0.0));
}

#[test]
fn top_volume_limit_skips_unreached_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_prices(dir.path());
    // 50% below yesterday's close is never reached
    let cfg_path = write_config(
        dir.path(),
        "type = \"TOP_VOLUME_LIMIT\"\ncount = 2\ndiscount_pct = 50.0",
        "seed = 1",
    );
    let config = RunConfig::load(&cfg_path).unwrap();
    let result = run_backtest(&config).unwrap();

    assert_eq!(result.summary.metrics.fills, 0);
    assert!(result.summary.metrics.skipped > 0);
    assert!((result.summary.final_equity - 100_000.0).abs() < 1e-9);
}

#[test]
fn same_config_same_result() {
    let dir = tempfile::tempdir().unwrap();
    write_prices(dir.path());
    let cfg_path = write_config(
        dir.path(),
        "type = \"EQUAL_WEIGHT\"",
        "seed = 99\nslippage = { type = \"RANDOM_BPS\", min_bps = 1.0, max_bps = 20.0 }",
    );
    let config = RunConfig::load(&cfg_path).unwrap();
    let a = run_backtest(&config).unwrap();
    let b = run_backtest(&config).unwrap();
    assert_eq!(a.summary, b.summary);
    assert_eq!(a.days, b.days);
}

#[test]
fn window_outside_data_is_data_error() {
    let dir = tempfile::tempdir().unwrap();
    write_prices(dir.path());
    let cfg_path = write_config(dir.path(), "type = \"EQUAL_WEIGHT\"", "seed = 1");
    let mut config = RunConfig::load(&cfg_path).unwrap();
    config.run.start = chrono::NaiveDate::from_ymd_opt(2030, 1, 1);
    assert!(matches!(run_backtest(&config), Err(RunError::Data(_))));
}
