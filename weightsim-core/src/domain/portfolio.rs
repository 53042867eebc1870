//! Portfolio — cash, positions, and the limits the ledger enforces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::position::Position;

/// Configuration limits checked when fills are applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioLimits {
    /// Gross leverage allowed. 1.0 means cash may not go negative.
    pub max_leverage: f64,
    pub allow_short: bool,
}

impl Default for PortfolioLimits {
    fn default() -> Self {
        Self {
            max_leverage: 1.0,
            allow_short: false,
        }
    }
}

/// Aggregate portfolio state, threaded by value from one day to the next.
///
/// Positions are keyed by symbol in a `BTreeMap` so every walk over the book
/// is lexicographic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    pub limits: PortfolioLimits,
    /// Equity from the most recent mark-to-market; sizes the next day's orders.
    pub last_equity: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub realized_pnl: f64,
    /// Cash dividends credited (or paid, on shorts) since the start.
    #[serde(default)]
    pub total_dividends: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64, limits: PortfolioLimits) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            limits,
            last_equity: initial_capital,
            total_commission: 0.0,
            total_slippage: 0.0,
            realized_pnl: 0.0,
            total_dividends: 0.0,
        }
    }

    /// Held quantity, zero when no position exists.
    pub fn quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.get(symbol).is_some_and(|p| !p.is_flat())
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol).filter(|p| !p.is_flat())
    }

    /// Lowest cash balance a BUY fill may leave behind.
    ///
    /// Zero without leverage; otherwise the borrowing headroom
    /// `(max_leverage - 1) * last_equity`, as a negative balance.
    pub fn min_cash(&self) -> f64 {
        let headroom = (self.limits.max_leverage - 1.0).max(0.0);
        -(headroom * self.last_equity.max(0.0))
    }

    /// Gross market value of all positions at the given prices.
    pub fn gross_exposure(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .iter()
            .filter_map(|(sym, pos)| prices.get(sym).map(|p| pos.market_value(*p).abs()))
            .sum()
    }
}
