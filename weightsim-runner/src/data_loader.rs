//! Market data loading for the runner.
//!
//! Reads a long-format CSV (`date,symbol,open,high,low,close,volume`, one row
//! per symbol per day, plus optional per-share `dividend` and `delisting_date`
//! columns), validates every row as a [`Bar`], and groups the rows into
//! date-sorted [`TradingDay`]s ready for the kernel.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use weightsim_core::domain::{Bar, TradingDay};
use weightsim_core::KernelError;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {source}")]
    InvalidRow {
        row: u64,
        #[source]
        source: KernelError,
    },

    #[error("duplicate bar for {symbol} on {date}")]
    Duplicate { symbol: String, date: NaiveDate },

    #[error("no bars left after filtering")]
    Empty,
}

/// Options controlling which rows are kept.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Keep only these symbols. Empty keeps everything.
    pub universe: Vec<String>,
}

impl LoadOptions {
    fn keeps(&self, date: NaiveDate, symbol: &str) -> bool {
        self.start.map_or(true, |s| date >= s)
            && self.end.map_or(true, |e| date <= e)
            && (self.universe.is_empty() || self.universe.iter().any(|u| u == symbol))
    }
}

/// Bars grouped by trading day, with provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub days: Vec<TradingDay>,
    pub symbols: BTreeSet<String>,
    /// BLAKE3 over the raw input bytes.
    pub dataset_hash: String,
}

impl LoadedData {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.first().map(|d| d.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.last().map(|d| d.date)
    }

    pub fn bar_count(&self) -> usize {
        self.days.iter().map(|d| d.bars.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    dividend: Option<f64>,
    #[serde(default)]
    delisting_date: Option<NaiveDate>,
}

/// Load and validate a CSV file.
pub fn load_days(path: &Path, opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = read_days(bytes.as_slice(), opts)?;
    tracing::info!(
        path = %path.display(),
        days = loaded.days.len(),
        symbols = loaded.symbols.len(),
        "market data loaded"
    );
    Ok(loaded)
}

/// Parse CSV from any reader.
pub fn read_days<R: Read>(mut reader: R, opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).map_err(|source| LoadError::Io {
        path: PathBuf::from("<reader>"),
        source,
    })?;
    let dataset_hash = blake3::hash(&raw).to_hex().to_string();

    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw.as_slice());

    let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, Bar>> = BTreeMap::new();
    let mut symbols = BTreeSet::new();

    for (i, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = record?;
        if !opts.keeps(row.date, &row.symbol) {
            continue;
        }
        // header is line 1
        let line = i as u64 + 2;
        let bar = Bar::new(
            row.symbol, row.date, row.open, row.high, row.low, row.close, row.volume,
        )
        .and_then(|bar| bar.with_dividend(row.dividend.unwrap_or(0.0)))
        .map(|bar| match row.delisting_date {
            Some(last) => bar.with_delisting(last),
            None => bar,
        })
        .map_err(|source| LoadError::InvalidRow { row: line, source })?;

        let day = by_date.entry(bar.date).or_default();
        if day.contains_key(&bar.symbol) {
            return Err(LoadError::Duplicate {
                symbol: bar.symbol,
                date: bar.date,
            });
        }
        symbols.insert(bar.symbol.clone());
        day.insert(bar.symbol.clone(), bar);
    }

    if by_date.is_empty() {
        return Err(LoadError::Empty);
    }

    let days = by_date
        .into_iter()
        .map(|(date, bars)| TradingDay { date, bars })
        .collect();

    Ok(LoadedData {
        days,
        symbols,
        dataset_hash,
    })
}
