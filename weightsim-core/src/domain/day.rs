//! One trading day of time-aligned bars.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::bar::{Bar, PriceField};
use crate::error::KernelError;

/// All bars for a single date, keyed by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub bars: BTreeMap<String, Bar>,
}

impl TradingDay {
    /// Build a day from bars, validating each one.
    ///
    /// Every bar must carry `date` and symbols must be unique.
    pub fn new(date: NaiveDate, bars: impl IntoIterator<Item = Bar>) -> Result<Self, KernelError> {
        let mut by_symbol = BTreeMap::new();
        for bar in bars {
            bar.validate()?;
            if bar.date != date {
                return Err(KernelError::InvalidBar {
                    symbol: bar.symbol.clone(),
                    date: bar.date,
                    reason: format!("bar dated {} placed on trading day {}", bar.date, date),
                });
            }
            if by_symbol.contains_key(&bar.symbol) {
                return Err(KernelError::InvalidBar {
                    symbol: bar.symbol.clone(),
                    date,
                    reason: "duplicate bar for symbol".to_string(),
                });
            }
            by_symbol.insert(bar.symbol.clone(), bar);
        }
        Ok(Self {
            date,
            bars: by_symbol,
        })
    }

    pub fn bar(&self, symbol: &str) -> Option<&Bar> {
        self.bars.get(symbol)
    }

    /// The chosen price field for every symbol trading today.
    pub fn prices(&self, field: PriceField) -> BTreeMap<String, f64> {
        self.bars
            .iter()
            .map(|(sym, bar)| (sym.clone(), bar.price(field)))
            .collect()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }
}

/// Mean volume per symbol over the last `lookback` days of `history`.
///
/// A symbol is averaged over the days it has a bar on; symbols absent from
/// the window are absent from the map.
pub fn trailing_adv(history: &[TradingDay], lookback: usize) -> BTreeMap<String, f64> {
    let window = &history[history.len().saturating_sub(lookback)..];
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for day in window {
        for (symbol, bar) in &day.bars {
            let entry = sums.entry(symbol.as_str()).or_insert((0.0, 0));
            entry.0 += bar.volume;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(symbol, (total, n))| (symbol.to_string(), total / n as f64))
        .collect()
}
