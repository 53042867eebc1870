//! Day loop — composes generator, engine and ledger over a trading calendar.
//!
//! Days run strictly in order: each day's sizing uses the previous day's
//! marked equity and positions. Per day:
//! 1. Ask the strategy for a [`StrategyOutput`] (it sees only earlier days)
//! 2. Generate orders from the weights and specs
//! 3. Execute them against the day's bars, with ADV from earlier days
//! 4. Apply fills in the ledger, sells before buys
//! 5. Credit dividends, mark to market and record a [`DayReport`]
//!
//! Fatal errors abort the run tagged with the offending day.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{trailing_adv, Fill, Order, OrderSpecs, Portfolio, TargetWeights, TradingDay};
use crate::error::KernelError;
use crate::execution::{ExecutionEngine, SkippedOrder};
use crate::ledger::{self, ClampedFill, Ledger, RejectedFill};
use crate::orders::OrderGenerator;
use crate::settings::KernelSettings;

/// What a strategy returns for one day.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutput {
    /// Target weights only; every order is MARKET.
    Weights(TargetWeights),
    /// Target weights plus per-symbol order overrides.
    WeightsAndSpecs(TargetWeights, OrderSpecs),
}

impl StrategyOutput {
    pub fn into_parts(self) -> (TargetWeights, OrderSpecs) {
        match self {
            StrategyOutput::Weights(weights) => (weights, OrderSpecs::new()),
            StrategyOutput::WeightsAndSpecs(weights, specs) => (weights, specs),
        }
    }
}

impl From<TargetWeights> for StrategyOutput {
    fn from(weights: TargetWeights) -> Self {
        StrategyOutput::Weights(weights)
    }
}

/// Read-only view handed to the strategy each day.
#[derive(Debug, Clone, Copy)]
pub struct DayContext<'a> {
    pub date: NaiveDate,
    /// Days strictly before `date`, oldest first.
    pub history: &'a [TradingDay],
    pub portfolio: &'a Portfolio,
}

impl<'a> DayContext<'a> {
    pub fn previous_day(&self) -> Option<&'a TradingDay> {
        self.history.last()
    }
}

/// The strategy collaborator.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn on_day(&mut self, ctx: &DayContext<'_>) -> StrategyOutput;
}

/// Everything that happened on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub orders: Vec<Order>,
    /// Fills as booked by the ledger, sells first.
    pub fills: Vec<Fill>,
    pub skipped: Vec<SkippedOrder>,
    pub clamped: Vec<ClampedFill>,
    pub rejected: Vec<RejectedFill>,
    pub dividends: f64,
    pub cash: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub portfolio: Portfolio,
    pub days: Vec<DayReport>,
}

impl RunOutcome {
    pub fn final_equity(&self) -> f64 {
        self.portfolio.last_equity
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.equity).collect()
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("day {date}: {source}")]
    Day {
        date: NaiveDate,
        #[source]
        source: KernelError,
    },

    #[error("trading days out of order: {next} follows {previous}")]
    CalendarOrder { previous: NaiveDate, next: NaiveDate },
}

impl SimulationError {
    pub fn date(&self) -> NaiveDate {
        match self {
            SimulationError::Day { date, .. } => *date,
            SimulationError::CalendarOrder { next, .. } => *next,
        }
    }
}

/// The simulation kernel configured for one run.
#[derive(Debug)]
pub struct Simulation {
    settings: KernelSettings,
    generator: OrderGenerator,
    engine: ExecutionEngine,
    ledger: Ledger,
}

impl Simulation {
    pub fn new(settings: KernelSettings) -> Result<Self, KernelError> {
        settings.validate()?;
        Ok(Self {
            generator: OrderGenerator::from_settings(&settings),
            engine: ExecutionEngine::from_settings(&settings),
            ledger: Ledger::from_settings(&settings),
            settings,
        })
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// Starting portfolio carrying this run's limits.
    pub fn initial_portfolio(&self, initial_capital: f64) -> Portfolio {
        Portfolio::new(initial_capital, self.settings.limits)
    }

    /// Run one day against the previous day's portfolio, without volume
    /// history.
    pub fn step(
        &self,
        portfolio: Portfolio,
        day: &TradingDay,
        output: StrategyOutput,
    ) -> Result<(Portfolio, DayReport), KernelError> {
        self.step_with_history(portfolio, &[], day, output)
    }

    /// Run one day; `history` holds the days before it, oldest first, and
    /// feeds the participation cap's ADV.
    ///
    /// Only fatal errors are returned; rejected fills and skipped orders are
    /// part of the report.
    pub fn step_with_history(
        &self,
        portfolio: Portfolio,
        history: &[TradingDay],
        day: &TradingDay,
        output: StrategyOutput,
    ) -> Result<(Portfolio, DayReport), KernelError> {
        let (weights, specs) = output.into_parts();
        let valuation = day.prices(self.settings.valuation_field);

        let orders = self.generator.generate(
            &portfolio,
            &weights,
            &specs,
            &valuation,
            portfolio.last_equity,
        )?;
        let adv = match self.settings.execution.max_participation {
            Some(_) => trailing_adv(history, self.settings.execution.adv_lookback),
            None => Default::default(),
        };
        let execution = self
            .engine
            .execute_with_adv(&orders, &day.bars, &adv, day.date)?;
        let outcome = self.ledger.apply(portfolio, &execution.fills);

        let mut portfolio = outcome.portfolio;
        let dividends = ledger::credit_dividends(&mut portfolio, day);
        let equity = ledger::mark_to_market(&portfolio, &valuation)?;
        portfolio.last_equity = equity;

        tracing::info!(
            date = %day.date,
            orders = orders.len(),
            fills = outcome.applied.len(),
            skipped = execution.skipped.len(),
            clamped = outcome.clamped.len(),
            rejected = outcome.rejected.len(),
            equity,
            "day complete"
        );

        let report = DayReport {
            date: day.date,
            orders,
            fills: outcome.applied,
            skipped: execution.skipped,
            clamped: outcome.clamped,
            rejected: outcome.rejected,
            dividends,
            cash: portfolio.cash,
            equity,
        };
        Ok((portfolio, report))
    }

    /// Run the whole calendar. Days must be strictly ascending.
    pub fn run(
        &self,
        initial: Portfolio,
        calendar: &[TradingDay],
        strategy: &mut dyn Strategy,
    ) -> Result<RunOutcome, SimulationError> {
        tracing::info!(
            strategy = strategy.name(),
            days = calendar.len(),
            seed = self.settings.seed,
            "simulation started"
        );

        let mut portfolio = initial;
        let mut days = Vec::with_capacity(calendar.len());

        for (i, day) in calendar.iter().enumerate() {
            if let Some(prev) = i.checked_sub(1).map(|p| &calendar[p]) {
                if prev.date >= day.date {
                    return Err(SimulationError::CalendarOrder {
                        previous: prev.date,
                        next: day.date,
                    });
                }
            }

            let ctx = DayContext {
                date: day.date,
                history: &calendar[..i],
                portfolio: &portfolio,
            };
            let output = strategy.on_day(&ctx);

            let (next, report) = self
                .step_with_history(portfolio, &calendar[..i], day, output)
                .map_err(|source| SimulationError::Day {
                    date: day.date,
                    source,
                })?;
            portfolio = next;
            days.push(report);
        }

        tracing::info!(
            strategy = strategy.name(),
            final_equity = portfolio.last_equity,
            "simulation finished"
        );
        Ok(RunOutcome { portfolio, days })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, OrderSpec};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn day(date: NaiveDate, close: f64) -> TradingDay {
        let bar = Bar {
            symbol: "A".into(),
            date,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10_000.0,
            dividend: 0.0,
            delisted_after: None,
        };
        TradingDay::new(date, [bar]).unwrap()
    }

    struct AllIn;

    impl Strategy for AllIn {
        fn name(&self) -> &str {
            "all_in"
        }

        fn on_day(&mut self, _ctx: &DayContext<'_>) -> StrategyOutput {
            StrategyOutput::Weights(TargetWeights::from([("A".to_string(), 1.0)]))
        }
    }

    #[test]
    fn weights_only_means_market() {
        let (weights, specs) =
            StrategyOutput::from(TargetWeights::from([("A".to_string(), 1.0)])).into_parts();
        assert_eq!(weights.len(), 1);
        assert!(specs.is_empty());
    }

    #[test]
    fn step_threads_equity_forward() {
        let sim = Simulation::new(KernelSettings::frictionless()).unwrap();
        let portfolio = sim.initial_portfolio(10_000.0);
        let output = StrategyOutput::Weights(TargetWeights::from([("A".to_string(), 1.0)]));
        let (p, report) = sim.step(portfolio, &day(d(2), 10.0), output).unwrap();
        assert_eq!(report.fills.len(), 1);
        assert_eq!(p.quantity("A"), 1000);
        assert_eq!(p.last_equity, 10_000.0);
        assert_eq!(report.equity, 10_000.0);
    }

    #[test]
    fn run_records_every_day() {
        let sim = Simulation::new(KernelSettings::frictionless()).unwrap();
        let calendar = vec![day(d(2), 10.0), day(d(3), 11.0), day(d(4), 12.0)];
        let outcome = sim
            .run(sim.initial_portfolio(10_000.0), &calendar, &mut AllIn)
            .unwrap();
        assert_eq!(outcome.days.len(), 3);
        // day 2 resizes to floor(10_000 / 11) = 909 shares (sells 91)
        // day 3 resizes to floor(11_000 / 12) = 916 shares (buys 7)
        let expected = [10_000.0, 11_000.0, 917.0 + 916.0 * 12.0];
        for (got, want) in outcome.equity_curve().iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(outcome.portfolio.quantity("A"), 916);
        assert!((outcome.final_equity() - 11_909.0).abs() < 1e-9);
    }

    #[test]
    fn fatal_error_names_the_day() {
        struct BadSpec;
        impl Strategy for BadSpec {
            fn name(&self) -> &str {
                "bad_spec"
            }
            fn on_day(&mut self, _ctx: &DayContext<'_>) -> StrategyOutput {
                StrategyOutput::WeightsAndSpecs(
                    TargetWeights::from([("A".to_string(), 1.0)]),
                    OrderSpecs::from([(
                        "A".to_string(),
                        OrderSpec {
                            kind: crate::domain::OrderKind::Limit,
                            limit_price: None,
                        },
                    )]),
                )
            }
        }

        let sim = Simulation::new(KernelSettings::frictionless()).unwrap();
        let err = sim
            .run(sim.initial_portfolio(1_000.0), &[day(d(5), 10.0)], &mut BadSpec)
            .unwrap_err();
        assert_eq!(err.date(), d(5));
        assert!(matches!(
            err,
            SimulationError::Day {
                source: KernelError::InvalidOrderSpec { .. },
                ..
            }
        ));
    }

    #[test]
    fn out_of_order_calendar_rejected() {
        let sim = Simulation::new(KernelSettings::frictionless()).unwrap();
        let calendar = vec![day(d(3), 10.0), day(d(2), 10.0)];
        let err = sim
            .run(sim.initial_portfolio(1_000.0), &calendar, &mut AllIn)
            .unwrap_err();
        assert!(matches!(err, SimulationError::CalendarOrder { .. }));
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut settings = KernelSettings::default();
        settings.limits.max_leverage = f64::NAN;
        assert!(Simulation::new(settings).is_err());
    }

    #[test]
    fn dividend_lands_in_the_days_equity() {
        let sim = Simulation::new(KernelSettings::frictionless()).unwrap();
        let mut payday = day(d(3), 10.0);
        if let Some(bar) = payday.bars.get_mut("A") {
            bar.dividend = 0.25;
        }
        let calendar = vec![day(d(2), 10.0), payday];
        let outcome = sim
            .run(sim.initial_portfolio(10_000.0), &calendar, &mut AllIn)
            .unwrap();
        // 1000 shares held into the ex-date
        assert_eq!(outcome.days[1].dividends, 250.0);
        assert!((outcome.days[1].equity - 10_250.0).abs() < 1e-9);
        assert!((outcome.portfolio.total_dividends - 250.0).abs() < 1e-9);
    }

    #[test]
    fn participation_cap_uses_earlier_days_volume() {
        let mut settings = KernelSettings::frictionless();
        settings.execution.max_participation = Some(0.01);
        let sim = Simulation::new(settings).unwrap();
        let calendar = vec![day(d(2), 10.0), day(d(3), 10.0)];
        let outcome = sim
            .run(sim.initial_portfolio(10_000.0), &calendar, &mut AllIn)
            .unwrap();
        // no history on the first day, so the cap does not bind
        assert_eq!(outcome.days[0].fills[0].quantity, 1000);

        let capped = sim
            .step_with_history(
                sim.initial_portfolio(10_000.0),
                &calendar[..1],
                &calendar[1],
                StrategyOutput::Weights(TargetWeights::from([("A".to_string(), 1.0)])),
            )
            .unwrap()
            .1;
        // 1% of 10_000 shares ADV allows 100, the order wants 1000
        assert!(capped.fills.is_empty());
        assert_eq!(capped.skipped[0].reason, crate::execution::SkipReason::ParticipationLimit);
    }
}
