//! Domain types for the simulation kernel

pub mod bar;
pub mod day;
pub mod fill;
pub mod order;
pub mod portfolio;
pub mod position;

use std::collections::BTreeMap;

pub use bar::{Bar, PriceField};
pub use day::{trailing_adv, TradingDay};
pub use fill::Fill;
pub use order::{Order, OrderKind, OrderSide, OrderSpec, OrderType};
pub use portfolio::{Portfolio, PortfolioLimits};
pub use position::Position;

/// Symbol type alias
pub type Symbol = String;

/// Symbol → fraction of equity. Negative weights are shorts.
pub type TargetWeights = BTreeMap<Symbol, f64>;

/// Symbol → order override supplied alongside target weights.
pub type OrderSpecs = BTreeMap<Symbol, OrderSpec>;

/// Symbol → price for one day.
pub type PriceMap = BTreeMap<Symbol, f64>;

/// Symbol → average daily volume in shares.
pub type VolumeMap = BTreeMap<Symbol, f64>;
