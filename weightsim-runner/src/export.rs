//! Artifact export: CSV event tapes, equity curve and a JSON summary.
//!
//! `summary.json` carries a `schema_version`; newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use weightsim_core::domain::Fill;
use weightsim_core::execution::SkippedOrder;
use weightsim_core::ledger::{ClampedFill, RejectedFill};

use crate::runner::{BacktestResult, RunSummary, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_summary_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize RunSummary to JSON")
}

pub fn import_summary_json(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize RunSummary from JSON")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── CSV ────────────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

const FILL_HEADER: [&str; 9] = [
    "date",
    "symbol",
    "side",
    "kind",
    "quantity",
    "price",
    "reference_price",
    "slippage",
    "commission",
];

fn fill_record(f: &Fill) -> [String; 9] {
    [
        f.date.to_string(),
        f.symbol.clone(),
        f.side.to_string(),
        f.kind.to_string(),
        f.quantity.to_string(),
        format!("{:.6}", f.price),
        format!("{:.6}", f.reference_price),
        format!("{:.2}", f.slippage),
        format!("{:.2}", f.commission),
    ]
}

/// Applied fills in the order the ledger booked them.
pub fn export_fills_csv<'a>(fills: impl IntoIterator<Item = &'a Fill>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(FILL_HEADER)?;
    for f in fills {
        wtr.write_record(fill_record(f))?;
    }
    finish(wtr)
}

/// Orders that produced no fill, with the reason.
pub fn export_skipped_csv<'a>(
    skipped: impl IntoIterator<Item = &'a SkippedOrder>,
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "symbol", "side", "quantity", "limit_price", "reason"])?;
    for s in skipped {
        let limit = s
            .order
            .order_type
            .limit_price()
            .map(|p| format!("{p:.6}"))
            .unwrap_or_default();
        wtr.write_record([
            s.date.to_string(),
            s.order.symbol.clone(),
            s.order.side.to_string(),
            s.order.quantity.to_string(),
            limit,
            s.reason.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Fills the ledger refused, with the refusal reason.
pub fn export_rejected_csv<'a>(
    rejected: impl IntoIterator<Item = &'a RejectedFill>,
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = FILL_HEADER.to_vec();
    header.push("reason");
    wtr.write_record(&header)?;
    for r in rejected {
        let mut record = fill_record(&r.fill).to_vec();
        record.push(r.reason.to_string());
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Buys trimmed to the cash floor: the booked fill plus the executed quantity.
pub fn export_clamped_csv<'a>(
    clamped: impl IntoIterator<Item = &'a ClampedFill>,
) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = FILL_HEADER.to_vec();
    header.push("requested");
    wtr.write_record(&header)?;
    for c in clamped {
        let mut record = fill_record(&c.fill).to_vec();
        record.push(c.requested.to_string());
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Date, cash, dividends credited and marked equity per day.
pub fn export_equity_csv(result: &BacktestResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "cash", "dividends", "equity"])?;
    for day in &result.days {
        wtr.write_record([
            day.date.to_string(),
            format!("{:.2}", day.cash),
            format!("{:.2}", day.dividends),
            format!("{:.2}", day.equity),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the full artifact set for one run.
///
/// Creates `{name}_{run_id prefix}/` under `output_dir` containing
/// `fills.csv`, `skipped.csv`, `clamped.csv`, `rejected.csv`, `equity.csv`
/// and `summary.json`. Rerunning the same config overwrites the same directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let summary = &result.summary;
    let prefix = summary.run_id.get(..12).unwrap_or(&summary.run_id);
    let run_dir = output_dir.join(format!("{}_{}", summary.name, prefix));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let fills = export_fills_csv(result.days.iter().flat_map(|d| &d.fills))?;
    let skipped = export_skipped_csv(result.days.iter().flat_map(|d| &d.skipped))?;
    let clamped = export_clamped_csv(result.days.iter().flat_map(|d| &d.clamped))?;
    let rejected = export_rejected_csv(result.days.iter().flat_map(|d| &d.rejected))?;
    let equity = export_equity_csv(result)?;
    let json = export_summary_json(summary)?;

    for (file, contents) in [
        ("fills.csv", fills),
        ("skipped.csv", skipped),
        ("clamped.csv", clamped),
        ("rejected.csv", rejected),
        ("equity.csv", equity),
        ("summary.json", json),
    ] {
        let path = run_dir.join(file);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}
