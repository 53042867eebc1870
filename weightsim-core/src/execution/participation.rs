//! Tradability and liquidity limits: delisted symbols, halted bars and
//! participation in average daily volume.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Per-order liquidity rules applied before matching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Largest fraction of trailing ADV a single order may take. `None` is uncapped.
    pub max_participation: Option<f64>,
    /// Trading days averaged into ADV, counted back from the day before the fill.
    pub adv_lookback: usize,
    /// Fill the capped quantity instead of skipping an oversized order.
    pub allow_partial_fills: bool,
    /// Skip every order on a zero-volume bar.
    pub skip_if_halted: bool,
    /// Skip orders dated after a bar's last tradable day.
    pub respect_delisting: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_participation: None,
            adv_lookback: 20,
            allow_partial_fills: false,
            skip_if_halted: false,
            respect_delisting: true,
        }
    }
}

/// Quantity an order may trade after liquidity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Allowance {
    Full,
    Partial(u64),
    Delisted,
    Halted,
    OverParticipation { cap: u64 },
}

impl ExecutionLimits {
    /// Decide how much of `quantity` may trade on `bar`, given the symbol's ADV.
    ///
    /// With no ADV history (or zero ADV) the participation cap does not bind.
    pub(crate) fn allowance(&self, quantity: u64, bar: &Bar, adv: Option<f64>) -> Allowance {
        if self.respect_delisting && bar.is_delisted() {
            return Allowance::Delisted;
        }
        if self.skip_if_halted && bar.is_halted() {
            return Allowance::Halted;
        }
        let (Some(rate), Some(adv)) = (self.max_participation, adv.filter(|v| *v > 0.0)) else {
            return Allowance::Full;
        };
        let cap = (rate * adv).floor() as u64;
        if quantity <= cap {
            Allowance::Full
        } else if self.allow_partial_fills && cap > 0 {
            Allowance::Partial(cap)
        } else {
            Allowance::OverParticipation { cap }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if let Some(rate) = self.max_participation {
            if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
                return Err(format!(
                    "execution.max_participation must be in (0, 1], got {rate}"
                ));
            }
        }
        if self.adv_lookback == 0 {
            return Err("execution.adv_lookback must be at least 1".to_string());
        }
        Ok(())
    }
}
