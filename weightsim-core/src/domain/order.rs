//! Orders and per-symbol order specs.
//!
//! An `Order` lives for exactly one trading day: the generator creates it and
//! the execution engine resolves it to a fill or a skip.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::KernelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> i64 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }

    pub fn direction(self) -> f64 {
        self.sign() as f64
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
        }
    }
}

/// How an order is matched against the day's bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Always fills at the execution price adjusted by slippage.
    Market,
    /// Fills at exactly `limit_price` if the day's range reached it.
    Limit { limit_price: f64 },
}

impl OrderType {
    pub fn kind(&self) -> OrderKind {
        match self {
            OrderType::Market => OrderKind::Market,
            OrderType::Limit { .. } => OrderKind::Limit,
        }
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit { limit_price } => Some(*limit_price),
        }
    }
}

/// Strategy-supplied override for one symbol. Absent spec means MARKET.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderSpec {
    pub kind: OrderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
}

impl OrderSpec {
    pub fn market() -> Self {
        Self::default()
    }

    pub fn limit(limit_price: f64) -> Self {
        Self {
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
        }
    }

    /// Resolve the spec into an order type, rejecting malformed limits.
    ///
    /// A MARKET spec ignores any limit price it carries.
    pub fn order_type(&self, symbol: &str) -> Result<OrderType, KernelError> {
        match self.kind {
            OrderKind::Market => Ok(OrderType::Market),
            OrderKind::Limit => {
                let invalid = |reason: &str| KernelError::InvalidOrderSpec {
                    symbol: symbol.to_string(),
                    reason: reason.to_string(),
                };
                let limit_price = self
                    .limit_price
                    .ok_or_else(|| invalid("LIMIT spec without a limit price"))?;
                if !limit_price.is_finite() || limit_price <= 0.0 {
                    return Err(invalid("limit price must be finite and positive"));
                }
                Ok(OrderType::Limit { limit_price })
            }
        }
    }
}

/// A single-day order. `quantity` is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: u64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: u64, limit_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit { limit_price },
        }
    }

    pub fn kind(&self) -> OrderKind {
        self.order_type.kind()
    }

    /// Signed share delta this order would apply if filled, `None` when the
    /// quantity does not fit in an `i64`.
    pub fn signed_quantity(&self) -> Option<i64> {
        i64::try_from(self.quantity).ok().map(|q| self.side.sign() * q)
    }
}
