use serde::{Deserialize, Serialize};

/// Signed holding in one symbol. Negative quantity is a short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: f64,
    /// Realized PnL accumulated while this position stayed open.
    pub realized_pnl: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: i64, avg_cost: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_cost,
            realized_pnl: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity as f64 * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.quantity as f64 * (current_price - self.avg_cost)
    }
}
