//! Order generator — target weights to a day's orders.
//!
//! For every symbol in `weights ∪ positions`, walked lexicographically:
//! `target = round(weight * equity / price)`, `delta = target - held`, and a
//! non-zero delta becomes one order. A target or delta outside `i64` is an
//! `InvalidOrderSpec`. Symbols dropped from the weights get a
//! target of zero so their positions are closed.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    Order, OrderSide, OrderSpecs, OrderType, Portfolio, PriceMap, TargetWeights,
};
use crate::error::KernelError;
use crate::settings::{KernelSettings, QuantityRounding, WeightConstraints};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderGenerator {
    rounding: QuantityRounding,
    constraints: WeightConstraints,
    max_leverage: f64,
}

impl Default for OrderGenerator {
    fn default() -> Self {
        Self::from_settings(&KernelSettings::default())
    }
}

impl OrderGenerator {
    pub fn new(rounding: QuantityRounding, constraints: WeightConstraints, max_leverage: f64) -> Self {
        Self {
            rounding,
            constraints,
            max_leverage,
        }
    }

    pub fn from_settings(settings: &KernelSettings) -> Self {
        Self::new(
            settings.quantity_rounding,
            settings.weights,
            settings.limits.max_leverage,
        )
    }

    /// Produce the day's orders, sorted by symbol.
    ///
    /// All order specs are validated before anything is sized, so a
    /// malformed spec fails the call even for a symbol with nothing to trade.
    pub fn generate(
        &self,
        portfolio: &Portfolio,
        target_weights: &TargetWeights,
        order_specs: &OrderSpecs,
        valuation_prices: &PriceMap,
        total_equity: f64,
    ) -> Result<Vec<Order>, KernelError> {
        let order_types = order_specs
            .iter()
            .map(|(symbol, spec)| spec.order_type(symbol).map(|ty| (symbol.as_str(), ty)))
            .collect::<Result<BTreeMap<&str, OrderType>, _>>()?;

        if let Some((symbol, weight)) = target_weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(KernelError::InvalidOrderSpec {
                symbol: symbol.clone(),
                reason: format!("target weight {weight} is not finite"),
            });
        }

        let weights = self.constrain(target_weights);
        let symbols: BTreeSet<&str> = weights
            .keys()
            .chain(portfolio.positions.keys())
            .map(String::as_str)
            .collect();

        let mut orders = Vec::new();
        for symbol in symbols {
            let weight = weights.get(symbol).copied().unwrap_or(0.0);
            let held = portfolio.quantity(symbol);
            let target = if weight == 0.0 {
                0
            } else {
                let price = valuation_prices
                    .get(symbol)
                    .copied()
                    .filter(|p| p.is_finite() && *p > 0.0)
                    .ok_or_else(|| {
                        KernelError::missing_price(symbol, "no valuation price for non-zero target weight")
                    })?;
                let raw = weight * total_equity / price;
                self.rounding.apply(raw).ok_or_else(|| KernelError::InvalidOrderSpec {
                    symbol: symbol.to_string(),
                    reason: format!("target of {raw} shares is not representable"),
                })?
            };

            // i64::MIN has no positive counterpart, so it cannot be an order size
            let delta = target
                .checked_sub(held)
                .filter(|d| *d != i64::MIN)
                .ok_or_else(|| KernelError::InvalidOrderSpec {
                    symbol: symbol.to_string(),
                    reason: format!("moving from {held} to {target} shares overflows"),
                })?;
            if delta == 0 {
                continue;
            }
            orders.push(Order {
                symbol: symbol.to_string(),
                side: if delta > 0 { OrderSide::Buy } else { OrderSide::Sell },
                quantity: delta.unsigned_abs(),
                order_type: order_types.get(symbol).copied().unwrap_or(OrderType::Market),
            });
        }
        Ok(orders)
    }

    /// Apply the per-symbol cap, gross-leverage scaling, then step rounding.
    pub fn constrain(&self, weights: &TargetWeights) -> TargetWeights {
        let mut shaped = weights.clone();

        if let Some(cap) = self.constraints.max_weight_per_symbol {
            for w in shaped.values_mut() {
                *w = w.clamp(-cap, cap);
            }
        }

        if self.constraints.scale_to_leverage {
            let gross: f64 = shaped.values().map(|w| w.abs()).sum();
            if gross > self.max_leverage {
                let factor = self.max_leverage / gross;
                for w in shaped.values_mut() {
                    *w *= factor;
                }
            }
        }

        if let Some(step) = self.constraints.rounding_step {
            for w in shaped.values_mut() {
                *w = (*w / step).round() * step;
            }
        }

        shaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderKind, OrderSpec, PortfolioLimits, Position};

    fn prices(entries: &[(&str, f64)]) -> PriceMap {
        entries.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn weights(entries: &[(&str, f64)]) -> TargetWeights {
        entries.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    fn cash_only(cash: f64) -> Portfolio {
        Portfolio::new(cash, PortfolioLimits::default())
    }

    #[test]
    fn full_weight_buys_floor_quantity() {
        let orders = OrderGenerator::default()
            .generate(
                &cash_only(10_000.0),
                &weights(&[("A", 1.0)]),
                &OrderSpecs::new(),
                &prices(&[("A", 10.0)]),
                10_000.0,
            )
            .unwrap();
        assert_eq!(orders, vec![Order::market("A", OrderSide::Buy, 1000)]);
    }

    #[test]
    fn fractional_shares_floor_toward_zero() {
        let orders = OrderGenerator::default()
            .generate(
                &cash_only(1_000.0),
                &weights(&[("A", 1.0)]),
                &OrderSpecs::new(),
                &prices(&[("A", 3.0)]),
                1_000.0,
            )
            .unwrap();
        assert_eq!(orders[0].quantity, 333);
    }

    #[test]
    fn dropped_symbol_is_closed() {
        let mut portfolio = cash_only(0.0);
        portfolio
            .positions
            .insert("A".into(), Position::new("A", 100, 10.0));
        let specs = OrderSpecs::from([("A".to_string(), OrderSpec::limit(9.5))]);
        let orders = OrderGenerator::default()
            .generate(&portfolio, &TargetWeights::new(), &specs, &PriceMap::new(), 1_000.0)
            .unwrap();
        assert_eq!(orders, vec![Order::limit("A", OrderSide::Sell, 100, 9.5)]);
    }

    #[test]
    fn zero_delta_produces_nothing() {
        let mut portfolio = cash_only(0.0);
        portfolio
            .positions
            .insert("A".into(), Position::new("A", 100, 10.0));
        let orders = OrderGenerator::default()
            .generate(
                &portfolio,
                &weights(&[("A", 1.0)]),
                &OrderSpecs::new(),
                &prices(&[("A", 10.0)]),
                1_000.0,
            )
            .unwrap();
        assert!(orders.is_empty());
    }

    #[test]
    fn limit_spec_without_price_fails_before_sizing() {
        let specs = OrderSpecs::from([(
            "B".to_string(),
            OrderSpec {
                kind: OrderKind::Limit,
                limit_price: None,
            },
        )]);
        let err = OrderGenerator::default()
            .generate(
                &cash_only(10_000.0),
                &weights(&[("A", 1.0)]),
                &specs,
                &prices(&[("A", 10.0)]),
                10_000.0,
            )
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidOrderSpec { ref symbol, .. } if symbol == "B"));
    }

    #[test]
    fn missing_valuation_price_is_fatal() {
        let err = OrderGenerator::default()
            .generate(
                &cash_only(10_000.0),
                &weights(&[("A", 0.5), ("B", 0.5)]),
                &OrderSpecs::new(),
                &prices(&[("A", 10.0)]),
                10_000.0,
            )
            .unwrap_err();
        assert!(matches!(err, KernelError::MissingPriceData { ref symbol, .. } if symbol == "B"));
    }

    #[test]
    fn zero_weight_without_price_is_fine() {
        let orders = OrderGenerator::default()
            .generate(
                &cash_only(10_000.0),
                &weights(&[("A", 0.0)]),
                &OrderSpecs::new(),
                &PriceMap::new(),
                10_000.0,
            )
            .unwrap();
        assert!(orders.is_empty());
    }

    #[test]
    fn orders_are_sorted_by_symbol() {
        let orders = OrderGenerator::default()
            .generate(
                &cash_only(9_000.0),
                &weights(&[("C", 0.3), ("A", 0.3), ("B", 0.3)]),
                &OrderSpecs::new(),
                &prices(&[("A", 10.0), ("B", 10.0), ("C", 10.0)]),
                9_000.0,
            )
            .unwrap();
        let symbols: Vec<&str> = orders.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);
    }

    #[test]
    fn negative_weight_sells_short() {
        let orders = OrderGenerator::default()
            .generate(
                &cash_only(10_000.0),
                &weights(&[("A", -0.5)]),
                &OrderSpecs::new(),
                &prices(&[("A", 10.0)]),
                10_000.0,
            )
            .unwrap();
        assert_eq!(orders, vec![Order::market("A", OrderSide::Sell, 500)]);
    }

    #[test]
    fn nan_weight_is_invalid() {
        let result = OrderGenerator::default().generate(
            &cash_only(10_000.0),
            &weights(&[("A", f64::NAN)]),
            &OrderSpecs::new(),
            &prices(&[("A", 10.0)]),
            10_000.0,
        );
        assert!(matches!(result, Err(KernelError::InvalidOrderSpec { .. })));
    }

    #[test]
    fn constraints_cap_scale_and_round() {
        let constraints = WeightConstraints {
            max_weight_per_symbol: Some(0.6),
            scale_to_leverage: true,
            rounding_step: Some(0.05),
        };
        let generator = OrderGenerator::new(QuantityRounding::Floor, constraints, 1.0);
        let shaped = generator.constrain(&weights(&[("A", 0.9), ("B", 0.6)]));
        // capped to 0.6 / 0.6, scaled by 1/1.2 to 0.5 / 0.5
        assert!((shaped["A"] - 0.5).abs() < 1e-10);
        assert!((shaped["B"] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn unconstrained_weights_pass_through() {
        let w = weights(&[("A", 0.37), ("B", 0.91)]);
        assert_eq!(OrderGenerator::default().constrain(&w), w);
    }

    #[test]
    fn absurd_weight_is_invalid_not_a_panic() {
        let mut portfolio = cash_only(0.0);
        portfolio
            .positions
            .insert("A".into(), Position::new("A", 100, 10.0));
        let err = OrderGenerator::default()
            .generate(
                &portfolio,
                &weights(&[("A", -1e20)]),
                &OrderSpecs::new(),
                &prices(&[("A", 10.0)]),
                1_000.0,
            )
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidOrderSpec { ref symbol, .. } if symbol == "A"));
    }

    #[test]
    fn delta_overflow_is_invalid() {
        let mut portfolio = cash_only(0.0);
        portfolio
            .positions
            .insert("A".into(), Position::new("A", i64::MAX, 1.0));
        // target of -9.2e18 shares minus a held i64::MAX cannot be represented
        let result = OrderGenerator::default().generate(
            &portfolio,
            &weights(&[("A", -0.92)]),
            &OrderSpecs::new(),
            &prices(&[("A", 1.0)]),
            1e19,
        );
        assert!(matches!(result, Err(KernelError::InvalidOrderSpec { .. })));
    }
}
