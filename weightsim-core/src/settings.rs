//! Kernel settings, passed in once at backtest start.

use serde::{Deserialize, Serialize};

use crate::domain::{PortfolioLimits, PriceField};
use crate::error::KernelError;
use crate::execution::{CommissionSchedule, ExecutionLimits, SlippageConfig};
use crate::ledger::CashPolicy;

/// Everything the kernel needs besides market data and the strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    pub limits: PortfolioLimits,
    pub commission: CommissionSchedule,
    pub slippage: SlippageConfig,
    /// Single source of randomness for the whole run.
    pub seed: u64,
    /// Price used for order sizing and mark-to-market.
    pub valuation_field: PriceField,
    /// Base price for market fills before slippage.
    pub execution_field: PriceField,
    pub quantity_rounding: QuantityRounding,
    pub weights: WeightConstraints,
    /// What the ledger does with a BUY that would breach the cash floor.
    pub cash_policy: CashPolicy,
    pub execution: ExecutionLimits,
}

/// How fractional target quantities become whole shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantityRounding {
    /// Truncate toward zero, never overshooting the target exposure.
    #[default]
    Floor,
    /// Round half away from zero.
    Nearest,
}

impl QuantityRounding {
    /// Whole shares for `raw`, or `None` if the result does not fit in an `i64`.
    pub fn apply(self, raw: f64) -> Option<i64> {
        let rounded = match self {
            QuantityRounding::Floor => raw.trunc(),
            QuantityRounding::Nearest => raw.round(),
        };
        // i64::MAX as f64 is 2^63, one past the largest i64
        let limit = i64::MAX as f64;
        (rounded.is_finite() && rounded.abs() < limit).then_some(rounded as i64)
    }
}

/// Optional shaping of target weights before sizing. All off by default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConstraints {
    /// Cap on |weight| for any single symbol.
    pub max_weight_per_symbol: Option<f64>,
    /// Scale all weights down when gross exposure exceeds `max_leverage`.
    pub scale_to_leverage: bool,
    /// Round each weight to a multiple of this step.
    pub rounding_step: Option<f64>,
}

impl KernelSettings {
    pub fn validate(&self) -> Result<(), KernelError> {
        let leverage = self.limits.max_leverage;
        if !leverage.is_finite() || leverage < 1.0 {
            return Err(KernelError::InvalidSettings(format!(
                "limits.max_leverage must be finite and >= 1, got {leverage}"
            )));
        }
        self.commission
            .validate()
            .map_err(KernelError::InvalidSettings)?;
        self.slippage.validate().map_err(KernelError::InvalidSettings)?;
        self.execution.validate().map_err(KernelError::InvalidSettings)?;
        if let Some(cap) = self.weights.max_weight_per_symbol {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(KernelError::InvalidSettings(format!(
                    "weights.max_weight_per_symbol must be positive, got {cap}"
                )));
            }
        }
        if let Some(step) = self.weights.rounding_step {
            if !step.is_finite() || step <= 0.0 {
                return Err(KernelError::InvalidSettings(format!(
                    "weights.rounding_step must be positive, got {step}"
                )));
            }
        }
        Ok(())
    }

    /// Zero commission and zero slippage.
    pub fn frictionless() -> Self {
        Self::default()
    }
}
