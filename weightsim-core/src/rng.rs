//! Keyed random streams for stochastic slippage.
//!
//! Every draw comes from a generator keyed by `(run seed, date, symbol, stream)`.
//! A symbol's slippage on a day depends on nothing else in the batch, so adding,
//! removing or reordering other orders never moves its fill price.

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;

const KEY_CONTEXT: &str = "weightsim 2024 slippage stream v1";

/// Run-level source of keyed generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// 32-byte generator seed for one key.
    ///
    /// The symbol is length-prefixed so `("AB", s)` and `("A", s')` can never
    /// hash the same input.
    pub fn seed_bytes(&self, date: NaiveDate, symbol: &str, stream: u64) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&date.num_days_from_ce().to_le_bytes());
        hasher.update(&(symbol.len() as u64).to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(&stream.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    pub fn rng_for(&self, date: NaiveDate, symbol: &str, stream: u64) -> StdRng {
        StdRng::from_seed(self.seed_bytes(date, symbol, stream))
    }
}
