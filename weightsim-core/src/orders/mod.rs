//! Order generation: target weights and order specs to a day's orders.

pub mod generator;

pub use generator::OrderGenerator;
