//! Slippage models: price adjustment for market orders
//!
//! Slippage is directional: buyers pay more, sellers receive less. Limit
//! orders never reach these models; they fill at their limit price.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, OrderSide};

/// Slippage model: computes the signed adjustment added to the base price.
pub trait SlippageModel: Send + Sync {
    /// Signed price adjustment per share: positive for buys, negative for sells.
    ///
    /// # Arguments
    /// - `side`: order direction
    /// - `quantity`: shares being filled
    /// - `base_price`: execution-field price before slippage
    /// - `bar`: the day's bar for the symbol
    /// - `rng`: stream seeded for this order alone
    fn adjustment(
        &self,
        side: OrderSide,
        quantity: u64,
        base_price: f64,
        bar: &Bar,
        rng: &mut StdRng,
    ) -> f64;

    /// Name of this model
    fn name(&self) -> &str;
}

/// Serializable slippage selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlippageConfig {
    #[default]
    None,
    /// Constant basis points of the base price.
    FixedBps { bps: f64 },
    /// Basis points drawn uniformly from `[min_bps, max_bps]` per order.
    RandomBps { min_bps: f64, max_bps: f64 },
    /// `k * price * sqrt(quantity / volume)`, using the bar's volume as liquidity.
    SquareRootImpact { k: f64 },
}

impl SlippageConfig {
    pub fn build(&self) -> Box<dyn SlippageModel> {
        match *self {
            SlippageConfig::None => Box::new(NoSlippage),
            SlippageConfig::FixedBps { bps } => Box::new(FixedBpsSlippage::new(bps)),
            SlippageConfig::RandomBps { min_bps, max_bps } => {
                Box::new(RandomBpsSlippage::new(min_bps, max_bps))
            }
            SlippageConfig::SquareRootImpact { k } => Box::new(SquareRootImpact::new(k)),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(format!("slippage.{name} must be finite and >= 0, got {v}"))
            }
        };
        match *self {
            SlippageConfig::None => Ok(()),
            SlippageConfig::FixedBps { bps } => non_negative("bps", bps),
            SlippageConfig::RandomBps { min_bps, max_bps } => {
                non_negative("min_bps", min_bps)?;
                non_negative("max_bps", max_bps)?;
                if min_bps > max_bps {
                    return Err(format!(
                        "slippage.min_bps ({min_bps}) exceeds slippage.max_bps ({max_bps})"
                    ));
                }
                Ok(())
            }
            SlippageConfig::SquareRootImpact { k } => non_negative("k", k),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlippage;

impl SlippageModel for NoSlippage {
    fn adjustment(&self, _: OrderSide, _: u64, _: f64, _: &Bar, _: &mut StdRng) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "NoSlippage"
    }
}

/// Fixed slippage in basis points of the base price.
#[derive(Debug, Clone, Copy)]
pub struct FixedBpsSlippage {
    pub bps: f64,
}

impl FixedBpsSlippage {
    pub fn new(bps: f64) -> Self {
        Self { bps }
    }
}

impl SlippageModel for FixedBpsSlippage {
    fn adjustment(&self, side: OrderSide, _: u64, base_price: f64, _: &Bar, _: &mut StdRng) -> f64 {
        side.direction() * base_price * (self.bps / 10_000.0)
    }

    fn name(&self) -> &str {
        "FixedBpsSlippage"
    }
}

/// Uniformly sampled basis points, reproducible through the seeded stream.
#[derive(Debug, Clone, Copy)]
pub struct RandomBpsSlippage {
    pub min_bps: f64,
    pub max_bps: f64,
}

impl RandomBpsSlippage {
    pub fn new(min_bps: f64, max_bps: f64) -> Self {
        Self { min_bps, max_bps }
    }
}

impl SlippageModel for RandomBpsSlippage {
    fn adjustment(
        &self,
        side: OrderSide,
        _: u64,
        base_price: f64,
        _: &Bar,
        rng: &mut StdRng,
    ) -> f64 {
        let bps = if self.max_bps > self.min_bps {
            rng.gen_range(self.min_bps..=self.max_bps)
        } else {
            self.min_bps
        };
        side.direction() * base_price * (bps / 10_000.0)
    }

    fn name(&self) -> &str {
        "RandomBpsSlippage"
    }
}

/// Square-root market impact against the day's traded volume.
#[derive(Debug, Clone, Copy)]
pub struct SquareRootImpact {
    pub k: f64,
}

impl SquareRootImpact {
    pub fn new(k: f64) -> Self {
        Self { k }
    }
}

impl SlippageModel for SquareRootImpact {
    fn adjustment(
        &self,
        side: OrderSide,
        quantity: u64,
        base_price: f64,
        bar: &Bar,
        _: &mut StdRng,
    ) -> f64 {
        if bar.volume <= 0.0 {
            tracing::warn!(symbol = %bar.symbol, date = %bar.date, "zero volume, no impact applied");
            return 0.0;
        }
        let participation = quantity as f64 / bar.volume;
        side.direction() * self.k * base_price * participation.sqrt()
    }

    fn name(&self) -> &str {
        "SquareRootImpact"
    }
}
