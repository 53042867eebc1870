//! Portfolio ledger — applies fills to cash and positions, then marks to market.
//!
//! A batch books every SELL before any BUY, keeping the given order within
//! each side, so a rebalance's sale proceeds fund its purchases. A SELL that
//! would open a disallowed short is rejected atomically. A BUY that would
//! take cash below the floor follows the run's [`CashPolicy`]: by default it
//! is clamped to the largest whole quantity the floor allows (commission
//! recomputed, slippage scaled), and rejected only if not one share fits.
//! A rejected fill leaves cash and that symbol's position exactly as they
//! were; the rest of the batch is still applied.

use serde::{Deserialize, Serialize};

use crate::domain::{Fill, OrderSide, Portfolio, Position, PriceMap, TradingDay};
use crate::error::KernelError;
use crate::execution::CommissionSchedule;
use crate::settings::KernelSettings;

/// What happens to a BUY that would breach the cash floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashPolicy {
    /// Book the largest quantity that keeps cash at or above the floor.
    #[default]
    Clamp,
    /// Refuse the whole fill.
    Reject,
}

/// A fill the ledger refused, with the policy it violated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedFill {
    pub fill: Fill,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: KernelError,
}

fn serialize_reason<S: serde::Serializer>(reason: &KernelError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

/// A BUY booked at less than its executed quantity to respect the cash floor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClampedFill {
    /// The fill as booked.
    pub fill: Fill,
    pub requested: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutcome {
    pub portfolio: Portfolio,
    /// Booked fills, sells first.
    pub applied: Vec<Fill>,
    pub clamped: Vec<ClampedFill>,
    pub rejected: Vec<RejectedFill>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ledger {
    commission: CommissionSchedule,
    cash_policy: CashPolicy,
}

impl Ledger {
    /// `commission` must be the schedule the engine charged, so a clamped
    /// fill is re-priced the same way.
    pub fn new(commission: CommissionSchedule, cash_policy: CashPolicy) -> Self {
        Self {
            commission,
            cash_policy,
        }
    }

    pub fn from_settings(settings: &KernelSettings) -> Self {
        Self::new(settings.commission, settings.cash_policy)
    }

    pub fn cash_policy(&self) -> CashPolicy {
        self.cash_policy
    }

    /// Apply a batch of fills, returning the updated portfolio.
    pub fn apply(&self, mut portfolio: Portfolio, fills: &[Fill]) -> LedgerOutcome {
        let mut applied = Vec::with_capacity(fills.len());
        let mut clamped = Vec::new();
        let mut rejected = Vec::new();

        let (sells, buys): (Vec<&Fill>, Vec<&Fill>) =
            fills.iter().partition(|f| f.side == OrderSide::Sell);

        for fill in sells.into_iter().chain(buys) {
            match self.book(&mut portfolio, fill) {
                Ok(booked) => {
                    if booked.quantity < fill.quantity {
                        tracing::warn!(
                            symbol = %fill.symbol,
                            requested = fill.quantity,
                            booked = booked.quantity,
                            "buy clamped to available cash"
                        );
                        clamped.push(ClampedFill {
                            fill: booked.clone(),
                            requested: fill.quantity,
                        });
                    }
                    applied.push(booked);
                }
                Err(reason) => {
                    tracing::warn!(
                        symbol = %fill.symbol,
                        side = %fill.side,
                        quantity = fill.quantity,
                        price = fill.price,
                        %reason,
                        "fill rejected"
                    );
                    rejected.push(RejectedFill {
                        fill: fill.clone(),
                        reason,
                    });
                }
            }
        }

        LedgerOutcome {
            portfolio,
            applied,
            clamped,
            rejected,
        }
    }

    /// Book one fill under this ledger's cash policy, returning what was booked.
    pub fn book(&self, portfolio: &mut Portfolio, fill: &Fill) -> Result<Fill, KernelError> {
        match apply_fill(portfolio, fill) {
            Ok(()) => Ok(fill.clone()),
            Err(err @ KernelError::InsufficientCash { .. }) if self.cash_policy == CashPolicy::Clamp => {
                let quantity = self.affordable_quantity(portfolio, fill);
                if quantity == 0 {
                    return Err(err);
                }
                let resized = self.resize(fill, quantity);
                apply_fill(portfolio, &resized)?;
                Ok(resized)
            }
            Err(err) => Err(err),
        }
    }

    /// Largest whole quantity of a BUY at `fill.price` that keeps cash at or
    /// above the floor once commission is charged.
    fn affordable_quantity(&self, portfolio: &Portfolio, fill: &Fill) -> u64 {
        let floor = portfolio.min_cash();
        let budget = portfolio.cash - floor;
        if !(budget.is_finite() && budget > 0.0 && fill.price > 0.0) {
            return 0;
        }
        let c = &self.commission;
        // cost(q) = q * price + max(fixed + q * (price * bps + per_share), min_per_order)
        let all_in = fill.price * (1.0 + c.bps / 10_000.0) + c.per_share;
        let by_fees = (budget - c.fixed) / all_in;
        let by_minimum = (budget - c.min_per_order) / fill.price;
        let estimate = by_fees.min(by_minimum).floor();
        let mut quantity = estimate.clamp(0.0, fill.quantity as f64) as u64;

        let fits = |q: u64| portfolio.cash - (fill.price * q as f64 + c.compute(fill.price, q)) >= floor;
        while quantity > 0 && !fits(quantity) {
            quantity -= 1;
        }
        quantity
    }

    fn resize(&self, fill: &Fill, quantity: u64) -> Fill {
        let share = quantity as f64 / fill.quantity as f64;
        Fill {
            quantity,
            slippage: fill.slippage * share,
            commission: self.commission.compute(fill.price, quantity),
            ..fill.clone()
        }
    }
}

/// Apply one fill as given, or leave the portfolio untouched and return why not.
pub fn apply_fill(portfolio: &mut Portfolio, fill: &Fill) -> Result<(), KernelError> {
    let held = portfolio.quantity(&fill.symbol);
    let resulting = fill
        .signed_quantity()
        .and_then(|delta| held.checked_add(delta))
        .ok_or_else(|| KernelError::InvalidOrderSpec {
            symbol: fill.symbol.clone(),
            reason: format!("position of {held} plus {} {} overflows", fill.side, fill.quantity),
        })?;

    if fill.side == OrderSide::Sell && resulting < 0 && !portfolio.limits.allow_short {
        return Err(KernelError::ShortSellingDisallowed {
            symbol: fill.symbol.clone(),
            quantity: fill.quantity,
            resulting,
        });
    }

    let cash_after = portfolio.cash + fill.cash_delta();
    if fill.side == OrderSide::Buy {
        let min_cash = portfolio.min_cash();
        if cash_after < min_cash {
            return Err(KernelError::InsufficientCash {
                symbol: fill.symbol.clone(),
                cash_after,
                min_cash,
            });
        }
    }

    let (position, realized) =
        next_position(portfolio.positions.get(&fill.symbol), fill, held, resulting);
    match position {
        Some(pos) => {
            portfolio.positions.insert(fill.symbol.clone(), pos);
        }
        None => {
            portfolio.positions.remove(&fill.symbol);
        }
    }
    portfolio.cash = cash_after;
    portfolio.realized_pnl += realized;
    portfolio.total_commission += fill.commission;
    portfolio.total_slippage += fill.slippage;
    Ok(())
}

/// Position after a fill, plus PnL realized by any reduction.
///
/// Adding in the same direction re-weights the average cost, reducing keeps
/// it, crossing through zero restarts it at the fill price. A flat result
/// yields `None`.
fn next_position(
    current: Option<&Position>,
    fill: &Fill,
    held: i64,
    resulting: i64,
) -> (Option<Position>, f64) {
    let (avg_cost, carried) = current.map_or((0.0, 0.0), |p| (p.avg_cost, p.realized_pnl));
    let delta = resulting - held;

    if held == 0 || held.signum() == delta.signum() {
        let cost = avg_cost * held.unsigned_abs() as f64 + fill.price * delta.unsigned_abs() as f64;
        let position = Position {
            symbol: fill.symbol.clone(),
            quantity: resulting,
            avg_cost: cost / resulting.unsigned_abs() as f64,
            realized_pnl: carried,
        };
        return (Some(position), 0.0);
    }

    let closed = held.unsigned_abs().min(delta.unsigned_abs()) as f64;
    let realized = closed * (fill.price - avg_cost) * held.signum() as f64;

    let position = if resulting == 0 {
        None
    } else if resulting.signum() == held.signum() {
        Some(Position {
            symbol: fill.symbol.clone(),
            quantity: resulting,
            avg_cost,
            realized_pnl: carried + realized,
        })
    } else {
        Some(Position {
            symbol: fill.symbol.clone(),
            quantity: resulting,
            avg_cost: fill.price,
            realized_pnl: carried + realized,
        })
    };
    (position, realized)
}

/// Total equity: `cash + Σ quantity × price`. Pure.
///
/// Every held symbol needs a valuation price; otherwise equity is undefined
/// and this fails with `MissingPriceData`.
pub fn mark_to_market(portfolio: &Portfolio, valuation_prices: &PriceMap) -> Result<f64, KernelError> {
    let mut equity = portfolio.cash;
    for (symbol, position) in &portfolio.positions {
        let price = valuation_prices
            .get(symbol)
            .copied()
            .filter(|p| p.is_finite())
            .ok_or_else(|| KernelError::missing_price(symbol, "no valuation price for held position"))?;
        equity += position.market_value(price);
    }
    Ok(equity)
}

/// Credit each held position's cash dividend for `day`, returning the total.
///
/// Shorts pay the dividend. Runs before [`mark_to_market`] so the day's
/// equity includes it.
pub fn credit_dividends(portfolio: &mut Portfolio, day: &TradingDay) -> f64 {
    let total: f64 = portfolio
        .positions
        .iter()
        .filter_map(|(symbol, pos)| {
            let bar = day.bar(symbol).filter(|b| b.dividend != 0.0)?;
            Some(pos.quantity as f64 * bar.dividend)
        })
        .sum();
    if total != 0.0 {
        tracing::debug!(date = %day.date, amount = total, "dividends credited");
    }
    portfolio.cash += total;
    portfolio.total_dividends += total;
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderKind, PortfolioLimits};
    use chrono::NaiveDate;

    fn fill(symbol: &str, side: OrderSide, quantity: u64, price: f64, commission: f64) -> Fill {
        Fill {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            reference_price: price,
            slippage: 0.0,
            commission,
            kind: OrderKind::Market,
        }
    }

    fn portfolio(cash: f64) -> Portfolio {
        Portfolio::new(cash, PortfolioLimits::default())
    }

    /// Frictionless ledger under the default clamp policy.
    fn apply(portfolio: Portfolio, fills: &[Fill]) -> LedgerOutcome {
        Ledger::default().apply(portfolio, fills)
    }

    fn shorting(cash: f64) -> Portfolio {
        Portfolio::new(
            cash,
            PortfolioLimits {
                max_leverage: 1.0,
                allow_short: true,
            },
        )
    }

    #[test]
    fn buy_creates_long_position() {
        let outcome = apply(portfolio(100_000.0), &[fill("SPY", OrderSide::Buy, 50, 100.0, 0.0)]);
        let p = &outcome.portfolio;
        assert_eq!(p.cash, 95_000.0);
        let pos = p.get_position("SPY").unwrap();
        assert_eq!(pos.quantity, 50);
        assert_eq!(pos.avg_cost, 100.0);
        assert_eq!(outcome.applied.len(), 1);
    }

    #[test]
    fn commission_reduces_cash() {
        let outcome = apply(portfolio(10_000.0), &[fill("A", OrderSide::Buy, 100, 10.0, 5.0)]);
        assert!((outcome.portfolio.cash - 8_995.0).abs() < 1e-10);
        assert_eq!(outcome.portfolio.total_commission, 5.0);
    }

    #[test]
    fn sell_closes_long_position() {
        let p = apply(portfolio(100_000.0), &[fill("SPY", OrderSide::Buy, 50, 100.0, 0.0)]).portfolio;
        let outcome = apply(p, &[fill("SPY", OrderSide::Sell, 50, 110.0, 0.0)]);
        assert!((outcome.portfolio.cash - 100_500.0).abs() < 1e-10);
        assert!(!outcome.portfolio.has_position("SPY"));
        assert!(outcome.portfolio.positions.is_empty());
        assert!((outcome.portfolio.realized_pnl - 500.0).abs() < 1e-10);
    }

    #[test]
    fn adding_reweights_average_cost() {
        let outcome = apply(
            portfolio(100_000.0),
            &[
                fill("A", OrderSide::Buy, 100, 10.0, 0.0),
                fill("A", OrderSide::Buy, 100, 20.0, 0.0),
            ],
        );
        let pos = outcome.portfolio.get_position("A").unwrap();
        assert_eq!(pos.quantity, 200);
        assert!((pos.avg_cost - 15.0).abs() < 1e-10);
    }

    #[test]
    fn partial_reduction_keeps_average_cost() {
        let p = apply(portfolio(10_000.0), &[fill("A", OrderSide::Buy, 100, 10.0, 0.0)]).portfolio;
        let outcome = apply(p, &[fill("A", OrderSide::Sell, 40, 12.0, 0.0)]);
        let pos = outcome.portfolio.get_position("A").unwrap();
        assert_eq!(pos.quantity, 60);
        assert_eq!(pos.avg_cost, 10.0);
        assert!((pos.realized_pnl - 80.0).abs() < 1e-10);
    }

    #[test]
    fn buy_beyond_cash_is_rejected_atomically() {
        let ledger = Ledger::new(
            CommissionSchedule {
                fixed: 1.0,
                ..CommissionSchedule::default()
            },
            CashPolicy::Reject,
        );
        let start = portfolio(1_000.0);
        let outcome = ledger.apply(
            start.clone(),
            &[
                fill("A", OrderSide::Buy, 100, 10.0, 1.0),
                fill("B", OrderSide::Buy, 10, 10.0, 1.0),
            ],
        );
        assert_eq!(outcome.rejected.len(), 1);
        assert!(matches!(
            outcome.rejected[0].reason,
            KernelError::InsufficientCash { ref symbol, .. } if symbol == "A"
        ));
        assert!(!outcome.portfolio.has_position("A"));
        assert_eq!(outcome.applied.len(), 1);
        assert!(outcome.clamped.is_empty());
        assert!((outcome.portfolio.cash - 899.0).abs() < 1e-10);
    }

    #[test]
    fn buy_beyond_cash_is_clamped_to_what_fits() {
        let schedule = CommissionSchedule {
            fixed: 1.0,
            ..CommissionSchedule::default()
        };
        let mut wide = fill("A", OrderSide::Buy, 1_000, 10.0, 1.0);
        wide.slippage = 50.0;
        let outcome = Ledger::new(schedule, CashPolicy::Clamp).apply(portfolio(10_000.0), &[wide]);

        assert!(outcome.rejected.is_empty());
        // 999 shares cost 9_990 + 1; a 1_000th would need 10_001
        assert_eq!(outcome.portfolio.quantity("A"), 999);
        assert!((outcome.portfolio.cash - 9.0).abs() < 1e-10);
        assert_eq!(outcome.clamped.len(), 1);
        assert_eq!(outcome.clamped[0].requested, 1_000);
        let booked = &outcome.applied[0];
        assert_eq!(booked.quantity, 999);
        assert_eq!(booked.commission, 1.0);
        assert!((booked.slippage - 49.95).abs() < 1e-10);
    }

    #[test]
    fn clamp_respects_minimum_commission() {
        let schedule = CommissionSchedule {
            per_share: 0.01,
            min_per_order: 5.0,
            ..CommissionSchedule::default()
        };
        let outcome = Ledger::new(schedule, CashPolicy::Clamp)
            .apply(portfolio(100.0), &[fill("A", OrderSide::Buy, 50, 10.0, 5.0)]);
        // 9 shares cost 90 + 5 minimum; 10 would cost 105
        assert_eq!(outcome.portfolio.quantity("A"), 9);
        assert!(outcome.portfolio.cash >= 0.0);
        assert_eq!(outcome.applied[0].commission, 5.0);
    }

    #[test]
    fn clamp_with_no_room_still_rejects() {
        let start = portfolio(5.0);
        let outcome = apply(start.clone(), &[fill("A", OrderSide::Buy, 10, 10.0, 0.0)]);
        assert_eq!(outcome.portfolio, start);
        assert!(outcome.applied.is_empty());
        assert!(matches!(outcome.rejected[0].reason, KernelError::InsufficientCash { .. }));
    }

    #[test]
    fn sells_fund_buys_in_the_same_batch() {
        let mut start = portfolio(0.0);
        start.positions.insert("A".into(), Position::new("A", 100, 8.0));
        start.positions.insert("B".into(), Position::new("B", 100, 12.0));

        let outcome = Ledger::new(CommissionSchedule::frictionless(), CashPolicy::Reject).apply(
            start,
            &[
                fill("A", OrderSide::Buy, 25, 8.0, 0.0),
                fill("B", OrderSide::Sell, 17, 12.0, 0.0),
            ],
        );

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.portfolio.quantity("A"), 125);
        assert_eq!(outcome.portfolio.quantity("B"), 83);
        assert!((outcome.portfolio.cash - 4.0).abs() < 1e-10);
        let booked: Vec<&str> = outcome.applied.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(booked, vec!["B", "A"]);
    }

    #[test]
    fn buys_keep_their_order_after_sells() {
        let mut start = portfolio(100.0);
        start.positions.insert("Z".into(), Position::new("Z", 10, 10.0));
        let outcome = apply(
            start,
            &[
                fill("A", OrderSide::Buy, 1, 10.0, 0.0),
                fill("C", OrderSide::Buy, 1, 10.0, 0.0),
                fill("Z", OrderSide::Sell, 10, 10.0, 0.0),
                fill("B", OrderSide::Buy, 1, 10.0, 0.0),
            ],
        );
        let booked: Vec<&str> = outcome.applied.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(booked, vec!["Z", "A", "C", "B"]);
    }

    #[test]
    fn oversized_sell_is_refused_not_wrapped() {
        let mut start = shorting(0.0);
        start.positions.insert("A".into(), Position::new("A", -i64::MAX, 1.0));
        let outcome = apply(start.clone(), &[fill("A", OrderSide::Sell, 10, 1.0, 0.0)]);
        assert_eq!(outcome.portfolio, start);
        assert!(matches!(outcome.rejected[0].reason, KernelError::InvalidOrderSpec { .. }));

        let huge = apply(shorting(0.0), &[fill("B", OrderSide::Sell, u64::MAX, 1.0, 0.0)]);
        assert_eq!(huge.rejected.len(), 1);
    }

    #[test]
    fn dividends_credit_longs_and_charge_shorts() {
        let mut p = shorting(1_000.0);
        p.positions.insert("A".into(), Position::new("A", 100, 10.0));
        p.positions.insert("B".into(), Position::new("B", -20, 10.0));
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bar = |symbol: &str, dividend: f64| {
            crate::domain::Bar::new(symbol, date, 10.0, 10.0, 10.0, 10.0, 1.0)
                .and_then(|b| b.with_dividend(dividend))
                .unwrap()
        };
        let day = TradingDay::new(date, [bar("A", 0.5), bar("B", 1.0), bar("C", 2.0)]).unwrap();

        let credited = credit_dividends(&mut p, &day);
        assert!((credited - 30.0).abs() < 1e-10);
        assert!((p.cash - 1_030.0).abs() < 1e-10);
        assert!((p.total_dividends - 30.0).abs() < 1e-10);
        assert_eq!(p.quantity("A"), 100);
    }

    #[test]
    fn no_dividend_leaves_cash_alone() {
        let mut p = portfolio(1_000.0);
        p.positions.insert("A".into(), Position::new("A", 100, 10.0));
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bar = crate::domain::Bar::new("A", date, 10.0, 10.0, 10.0, 10.0, 1.0).unwrap();
        let day = TradingDay::new(date, [bar]).unwrap();
        assert_eq!(credit_dividends(&mut p, &day), 0.0);
        assert_eq!(p.cash, 1_000.0);
    }

    #[test]
    fn leverage_allows_negative_cash() {
        let mut start = Portfolio::new(
            1_000.0,
            PortfolioLimits {
                max_leverage: 2.0,
                allow_short: false,
            },
        );
        start.last_equity = 1_000.0;
        let outcome = apply(start, &[fill("A", OrderSide::Buy, 150, 10.0, 0.0)]);
        assert!(outcome.rejected.is_empty());
        assert!((outcome.portfolio.cash + 500.0).abs() < 1e-10);
    }

    #[test]
    fn short_sale_rejected_when_disallowed() {
        let start = portfolio(1_000.0);
        let outcome = apply(start.clone(), &[fill("A", OrderSide::Sell, 10, 10.0, 0.0)]);
        assert_eq!(outcome.portfolio, start);
        assert!(matches!(
            outcome.rejected[0].reason,
            KernelError::ShortSellingDisallowed { resulting: -10, .. }
        ));
    }

    #[test]
    fn oversell_rejected_when_disallowed() {
        let p = apply(portfolio(1_000.0), &[fill("A", OrderSide::Buy, 10, 10.0, 0.0)]).portfolio;
        let outcome = apply(p.clone(), &[fill("A", OrderSide::Sell, 20, 10.0, 0.0)]);
        assert_eq!(outcome.portfolio, p);
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn short_then_cover() {
        let p = apply(shorting(1_000.0), &[fill("A", OrderSide::Sell, 10, 10.0, 0.0)]).portfolio;
        let pos = p.get_position("A").unwrap();
        assert_eq!(pos.quantity, -10);
        assert_eq!(p.cash, 1_100.0);

        let outcome = apply(p, &[fill("A", OrderSide::Buy, 10, 8.0, 0.0)]);
        assert!(outcome.portfolio.positions.is_empty());
        assert!((outcome.portfolio.cash - 1_020.0).abs() < 1e-10);
        assert!((outcome.portfolio.realized_pnl - 20.0).abs() < 1e-10);
    }

    #[test]
    fn crossing_zero_resets_average_cost() {
        let p = apply(shorting(10_000.0), &[fill("A", OrderSide::Buy, 10, 10.0, 0.0)]).portfolio;
        let outcome = apply(p, &[fill("A", OrderSide::Sell, 30, 12.0, 0.0)]);
        let pos = outcome.portfolio.get_position("A").unwrap();
        assert_eq!(pos.quantity, -20);
        assert_eq!(pos.avg_cost, 12.0);
        assert!((outcome.portfolio.realized_pnl - 20.0).abs() < 1e-10);
    }

    #[test]
    fn mark_to_market_sums_positions() {
        let p = apply(portfolio(10_000.0), &[fill("A", OrderSide::Buy, 100, 10.0, 0.0)]).portfolio;
        let prices = PriceMap::from([("A".to_string(), 12.0)]);
        let equity = mark_to_market(&p, &prices).unwrap();
        assert!((equity - 10_200.0).abs() < 1e-10);
        // pure: cash and positions untouched
        assert_eq!(p.cash, 9_000.0);
    }

    #[test]
    fn mark_to_market_requires_prices_for_held_symbols() {
        let p = apply(portfolio(10_000.0), &[fill("A", OrderSide::Buy, 100, 10.0, 0.0)]).portfolio;
        let err = mark_to_market(&p, &PriceMap::new()).unwrap_err();
        assert!(matches!(err, KernelError::MissingPriceData { .. }));
    }

    #[test]
    fn mark_to_market_of_cash_only_needs_no_prices() {
        assert_eq!(mark_to_market(&portfolio(500.0), &PriceMap::new()).unwrap(), 500.0);
    }
}
