use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::order::{OrderKind, OrderSide};

/// Fill record. Created at most once per order, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub date: NaiveDate,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    /// Executed price per share.
    pub price: f64,
    /// Execution-field price before slippage.
    pub reference_price: f64,
    /// Total slippage cost in currency (always >= 0).
    pub slippage: f64,
    pub commission: f64,
    pub kind: OrderKind,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity as f64
    }

    /// `None` when the quantity does not fit in an `i64`.
    pub fn signed_quantity(&self) -> Option<i64> {
        i64::try_from(self.quantity).ok().map(|q| self.side.sign() * q)
    }

    /// Change in cash when this fill settles: buys pay notional plus
    /// commission, sells receive notional minus commission.
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            OrderSide::Buy => -(self.notional() + self.commission),
            OrderSide::Sell => self.notional() - self.commission,
        }
    }
}
