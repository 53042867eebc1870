//! Built-in strategies.
//!
//! Each one looks only at `ctx.history` (days before the one being traded)
//! and the current portfolio, never at the bars it will be filled against.

use weightsim_core::domain::{OrderSpec, OrderSpecs, TargetWeights, TradingDay};
use weightsim_core::{DayContext, Strategy, StrategyOutput};

use crate::config::StrategyConfig;

/// Build the strategy a config names.
pub fn build_strategy(config: &StrategyConfig) -> Box<dyn Strategy> {
    match config {
        StrategyConfig::EqualWeight { symbols, gross } => {
            Box::new(EqualWeight::new(symbols.clone(), *gross))
        }
        StrategyConfig::TopVolumeLimit {
            count,
            discount_pct,
            gross,
        } => Box::new(TopVolumeLimit::new(*count, *discount_pct, *gross)),
        StrategyConfig::BuyAndHold { symbol } => Box::new(BuyAndHold::new(symbol.clone())),
    }
}

fn equal_weights<'a>(symbols: impl IntoIterator<Item = &'a str>, gross: f64) -> TargetWeights {
    let symbols: Vec<&str> = symbols.into_iter().collect();
    if symbols.is_empty() {
        return TargetWeights::new();
    }
    let w = gross / symbols.len() as f64;
    symbols.into_iter().map(|s| (s.to_string(), w)).collect()
}

/// Equal weight over a fixed list (or everything) that traded yesterday.
#[derive(Debug, Clone)]
pub struct EqualWeight {
    symbols: Vec<String>,
    gross: f64,
}

impl EqualWeight {
    pub fn new(symbols: Vec<String>, gross: f64) -> Self {
        Self { symbols, gross }
    }
}

impl Strategy for EqualWeight {
    fn name(&self) -> &str {
        "equal_weight"
    }

    fn on_day(&mut self, ctx: &DayContext<'_>) -> StrategyOutput {
        let Some(prev) = ctx.previous_day() else {
            return StrategyOutput::Weights(TargetWeights::new());
        };
        let weights = if self.symbols.is_empty() {
            equal_weights(prev.symbols(), self.gross)
        } else {
            equal_weights(
                self.symbols
                    .iter()
                    .map(String::as_str)
                    .filter(|s| prev.bars.contains_key(*s)),
                self.gross,
            )
        };
        StrategyOutput::Weights(weights)
    }
}

/// Rotate into yesterday's most-traded names, entering new names with a
/// discounted limit buy and adjusting existing ones at market.
#[derive(Debug, Clone)]
pub struct TopVolumeLimit {
    count: usize,
    discount_pct: f64,
    gross: f64,
}

impl TopVolumeLimit {
    pub fn new(count: usize, discount_pct: f64, gross: f64) -> Self {
        Self {
            count,
            discount_pct,
            gross,
        }
    }

    fn top_symbols<'a>(&self, day: &'a TradingDay) -> Vec<&'a str> {
        let mut ranked: Vec<(&str, f64)> = day
            .bars
            .iter()
            .map(|(sym, bar)| (sym.as_str(), bar.volume))
            .collect();
        // volume descending, then symbol for ties
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(self.count).map(|(s, _)| s).collect()
    }
}

impl Strategy for TopVolumeLimit {
    fn name(&self) -> &str {
        "top_volume_limit"
    }

    fn on_day(&mut self, ctx: &DayContext<'_>) -> StrategyOutput {
        let Some(prev) = ctx.previous_day() else {
            return StrategyOutput::Weights(TargetWeights::new());
        };
        let picks = self.top_symbols(prev);
        let weights = equal_weights(picks.iter().copied(), self.gross);

        let discount = 1.0 - self.discount_pct / 100.0;
        let specs: OrderSpecs = picks
            .iter()
            .filter(|sym| !ctx.portfolio.has_position(sym))
            .filter_map(|sym| {
                prev.bar(sym)
                    .map(|bar| (sym.to_string(), OrderSpec::limit(bar.close * discount)))
            })
            .collect();

        if specs.is_empty() {
            StrategyOutput::Weights(weights)
        } else {
            StrategyOutput::WeightsAndSpecs(weights, specs)
        }
    }
}

/// Fully invested in one symbol.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    symbol: String,
}

impl BuyAndHold {
    pub fn new(symbol: String) -> Self {
        Self { symbol }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_day(&mut self, _ctx: &DayContext<'_>) -> StrategyOutput {
        StrategyOutput::Weights(TargetWeights::from([(self.symbol.clone(), 1.0)]))
    }
}
