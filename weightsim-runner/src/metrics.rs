//! Performance metrics — pure functions over a run's equity curve.
//!
//! Curves passed here start with the initial capital followed by one
//! post-mark equity per trading day.

use serde::{Deserialize, Serialize};
use weightsim_core::RunOutcome;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Aggregate performance and activity figures for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub fills: usize,
    pub skipped: usize,
    /// Buys booked below their executed quantity to respect the cash floor.
    #[serde(default)]
    pub clamped: usize,
    pub rejected: usize,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub realized_pnl: f64,
    #[serde(default)]
    pub total_dividends: f64,
}

impl PerformanceMetrics {
    pub fn compute(outcome: &RunOutcome, initial_capital: f64) -> Self {
        let curve = equity_curve_with_start(outcome, initial_capital);
        let trading_days = outcome.days.len();
        Self {
            total_return: total_return(&curve),
            cagr: cagr(&curve, trading_days),
            sharpe: sharpe_ratio(&curve, 0.0),
            sortino: sortino_ratio(&curve, 0.0),
            max_drawdown: max_drawdown(&curve),
            fills: outcome.days.iter().map(|d| d.fills.len()).sum(),
            skipped: outcome.days.iter().map(|d| d.skipped.len()).sum(),
            clamped: outcome.days.iter().map(|d| d.clamped.len()).sum(),
            rejected: outcome.days.iter().map(|d| d.rejected.len()).sum(),
            total_commission: outcome.portfolio.total_commission,
            total_slippage: outcome.portfolio.total_slippage,
            realized_pnl: outcome.portfolio.realized_pnl,
            total_dividends: outcome.portfolio.total_dividends,
        }
    }
}

/// Initial capital followed by each day's marked equity.
pub fn equity_curve_with_start(outcome: &RunOutcome, initial_capital: f64) -> Vec<f64> {
    std::iter::once(initial_capital)
        .chain(outcome.days.iter().map(|d| d.equity))
        .collect()
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Compound annual growth rate, assuming 252 trading days per year.
pub fn cagr(equity_curve: &[f64], trading_days: usize) -> f64 {
    if trading_days < 2 {
        return 0.0;
    }
    let (Some(&initial), Some(&last)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if initial <= 0.0 || last <= 0.0 {
        return 0.0;
    }
    let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
    (last / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from daily returns. 0.0 when variance is zero.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let excess = excess_returns(equity_curve, risk_free_rate);
    if excess.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let excess = excess_returns(equity_curve, risk_free_rate);
    if excess.len() < 2 {
        return 0.0;
    }
    let downside: f64 = excess.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    if downside <= 0.0 {
        return 0.0;
    }
    let downside_std = (downside / excess.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / downside_std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction (-0.15 is a 15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Simple day-over-day returns. Days following a non-positive equity are skipped.
pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn excess_returns(equity_curve: &[f64], risk_free_rate: f64) -> Vec<f64> {
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    daily_returns(equity_curve)
        .into_iter()
        .map(|r| r - daily_rf)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_return_basic() {
        assert!((total_return(&[100.0, 110.0, 121.0]) - 0.21).abs() < 1e-10);
        assert_eq!(total_return(&[100.0]), 0.0);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn cagr_one_year_matches_total_return() {
        let mut curve = vec![100.0; 252];
        curve.push(120.0);
        assert!((cagr(&curve, 252) - 0.2).abs() < 1e-10);
    }

    #[test]
    fn flat_curve_has_no_risk_metrics() {
        let curve = [100.0; 10];
        assert_eq!(sharpe_ratio(&curve, 0.0), 0.0);
        assert_eq!(sortino_ratio(&curve, 0.0), 0.0);
        assert_eq!(max_drawdown(&curve), 0.0);
    }

    #[test]
    fn max_drawdown_from_peak() {
        let curve = [100.0, 120.0, 90.0, 130.0, 117.0];
        assert!((max_drawdown(&curve) + 0.25).abs() < 1e-10);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let curve: Vec<f64> = (0..50)
            .map(|i| 100.0 * (1.0 + 0.001 * (i % 3) as f64) * 1.002_f64.powi(i))
            .collect();
        assert!(sharpe_ratio(&curve, 0.0) > 0.0);
    }

    #[test]
    fn daily_returns_skip_non_positive_base() {
        let r = daily_returns(&[100.0, 0.0, 50.0, 55.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] + 1.0).abs() < 1e-12);
        assert!((r[1] - 0.1).abs() < 1e-12);
    }
}
