//! Execution engine — matches a day's orders against that day's bars.
//!
//! Each order resolves to exactly one terminal state:
//! - MARKET: always FILLED at the execution price moved by slippage.
//! - LIMIT BUY: FILLED at the limit iff `limit_price >= bar.low`.
//! - LIMIT SELL: FILLED at the limit iff `limit_price <= bar.high`.
//! - Unreached limits are SKIPPED with a reason; they are not errors.
//!
//! Before matching, [`ExecutionLimits`] may skip an order on a delisted or
//! halted bar, or trim or skip one that exceeds its share of trailing ADV.
//!
//! Orders never interact, so they are matched in parallel. Slippage draws
//! come from a stream keyed by (seed, date, symbol) alone, so one symbol's
//! fill never depends on which other symbols trade that day. Outputs keep
//! input order.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::commission::CommissionSchedule;
use super::participation::{Allowance, ExecutionLimits};
use super::slippage::SlippageModel;
use crate::domain::{Bar, Fill, Order, OrderSide, OrderType, PriceField, VolumeMap};
use crate::error::KernelError;
use crate::rng::RngHierarchy;
use crate::settings::KernelSettings;

/// Smallest price a slipped sell can print at.
const MIN_FILL_PRICE: f64 = 1e-6;

/// At most one order per symbol per day, so one stream per symbol suffices.
const SLIPPAGE_STREAM: u64 = 0;

/// Why an order produced no fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    PriceNotReached,
    /// The bar is dated after the symbol's last tradable day.
    Delisted,
    /// The bar traded no volume.
    Halted,
    /// The order exceeds the configured share of ADV.
    ParticipationLimit,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PriceNotReached => write!(f, "price not reached"),
            SkipReason::Delisted => write!(f, "delisted"),
            SkipReason::Halted => write!(f, "halted"),
            SkipReason::ParticipationLimit => write!(f, "participation limit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedOrder {
    pub date: NaiveDate,
    pub order: Order,
    pub reason: SkipReason,
}

/// Fills and skips for one day, each in the order the orders were given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub fills: Vec<Fill>,
    pub skipped: Vec<SkippedOrder>,
}

enum Outcome {
    Filled(Fill),
    Skipped(SkippedOrder),
}

pub struct ExecutionEngine {
    slippage: Box<dyn SlippageModel>,
    commission: CommissionSchedule,
    execution_field: PriceField,
    limits: ExecutionLimits,
    rng: RngHierarchy,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("slippage", &self.slippage.name())
            .field("commission", &self.commission)
            .field("execution_field", &self.execution_field)
            .field("limits", &self.limits)
            .field("seed", &self.rng.master_seed())
            .finish()
    }
}

impl ExecutionEngine {
    pub fn new(
        slippage: Box<dyn SlippageModel>,
        commission: CommissionSchedule,
        execution_field: PriceField,
        seed: u64,
    ) -> Self {
        Self {
            slippage,
            commission,
            execution_field,
            limits: ExecutionLimits::default(),
            rng: RngHierarchy::new(seed),
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn from_settings(settings: &KernelSettings) -> Self {
        Self::new(
            settings.slippage.build(),
            settings.commission,
            settings.execution_field,
            settings.seed,
        )
        .with_limits(settings.execution)
    }

    pub fn slippage_model(&self) -> &dyn SlippageModel {
        self.slippage.as_ref()
    }

    /// Match every order against its symbol's bar for `date`, with no ADV
    /// history (the participation cap does not bind).
    pub fn execute(
        &self,
        orders: &[Order],
        bars: &BTreeMap<String, Bar>,
        date: NaiveDate,
    ) -> Result<ExecutionResult, KernelError> {
        self.execute_with_adv(orders, bars, &VolumeMap::new(), date)
    }

    /// Match every order against its symbol's bar for `date`.
    ///
    /// Fails with `MissingPriceData` if any order's symbol has no bar; in
    /// that case no order is resolved.
    pub fn execute_with_adv(
        &self,
        orders: &[Order],
        bars: &BTreeMap<String, Bar>,
        adv: &VolumeMap,
        date: NaiveDate,
    ) -> Result<ExecutionResult, KernelError> {
        let matched: Vec<(&Order, &Bar)> = orders
            .iter()
            .map(|order| {
                bars.get(&order.symbol).map(|bar| (order, bar)).ok_or_else(|| {
                    KernelError::missing_price(&order.symbol, format!("no bar on {date}"))
                })
            })
            .collect::<Result<_, _>>()?;

        let outcomes: Vec<Outcome> = matched
            .par_iter()
            .map(|(order, bar)| {
                let adv = adv.get(&order.symbol).copied();
                self.match_order(order, bar, adv, date)
            })
            .collect();

        let mut result = ExecutionResult::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Filled(fill) => {
                    tracing::debug!(
                        symbol = %fill.symbol,
                        side = %fill.side,
                        quantity = fill.quantity,
                        price = fill.price,
                        kind = %fill.kind,
                        "order filled"
                    );
                    result.fills.push(fill);
                }
                Outcome::Skipped(skip) => {
                    tracing::debug!(
                        symbol = %skip.order.symbol,
                        side = %skip.order.side,
                        reason = %skip.reason,
                        "order skipped"
                    );
                    result.skipped.push(skip);
                }
            }
        }
        Ok(result)
    }

    fn match_order(&self, order: &Order, bar: &Bar, adv: Option<f64>, date: NaiveDate) -> Outcome {
        let skip = |reason| {
            Outcome::Skipped(SkippedOrder {
                date,
                order: order.clone(),
                reason,
            })
        };
        let quantity = match self.limits.allowance(order.quantity, bar, adv) {
            Allowance::Full => order.quantity,
            Allowance::Partial(cap) => {
                tracing::debug!(
                    symbol = %order.symbol,
                    requested = order.quantity,
                    filled = cap,
                    "order trimmed to participation cap"
                );
                cap
            }
            Allowance::Delisted => return skip(SkipReason::Delisted),
            Allowance::Halted => return skip(SkipReason::Halted),
            Allowance::OverParticipation { .. } => return skip(SkipReason::ParticipationLimit),
        };

        let reference_price = bar.price(self.execution_field);
        let (price, slippage_per_share) = match order.order_type {
            OrderType::Market => {
                let mut rng = self.rng.rng_for(date, &order.symbol, SLIPPAGE_STREAM);
                let adj = self.slippage.adjustment(order.side, quantity, reference_price, bar, &mut rng);
                let price = (reference_price + adj).max(MIN_FILL_PRICE);
                (price, (price - reference_price).abs())
            }
            OrderType::Limit { limit_price } => {
                let reached = match order.side {
                    OrderSide::Buy => limit_price >= bar.low,
                    OrderSide::Sell => limit_price <= bar.high,
                };
                if !reached {
                    return skip(SkipReason::PriceNotReached);
                }
                (limit_price, 0.0)
            }
        };

        Outcome::Filled(Fill {
            date,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            reference_price,
            slippage: slippage_per_share * quantity as f64,
            commission: self.commission.compute(price, quantity),
            kind: order.kind(),
        })
    }
}
