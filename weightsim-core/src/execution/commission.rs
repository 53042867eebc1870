//! Commission schedule.
//!
//! `commission = max(fixed + notional * bps / 10_000 + per_share * qty, min_per_order)`
//! charged on every fill regardless of side or order kind.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionSchedule {
    /// Flat fee per fill.
    pub fixed: f64,
    /// Proportional fee on notional, in basis points.
    pub bps: f64,
    pub per_share: f64,
    /// Floor applied after the other components are summed.
    pub min_per_order: f64,
}

impl CommissionSchedule {
    pub fn frictionless() -> Self {
        Self::default()
    }

    pub fn bps(bps: f64) -> Self {
        Self {
            bps,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.fixed == 0.0 && self.bps == 0.0 && self.per_share == 0.0 && self.min_per_order == 0.0
    }

    pub fn compute(&self, price: f64, quantity: u64) -> f64 {
        let qty = quantity as f64;
        let fee = self.fixed + price * qty * (self.bps / 10_000.0) + self.per_share * qty;
        fee.max(self.min_per_order)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let fields = [
            ("fixed", self.fixed),
            ("bps", self.bps),
            ("per_share", self.per_share),
            ("min_per_order", self.min_per_order),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("commission.{name} must be finite and >= 0, got {value}"));
            }
        }
        Ok(())
    }
}
