//! Kernel error taxonomy.
//!
//! Fatal variants abort the day (and the run). `InsufficientCash` and
//! `ShortSellingDisallowed` are policy violations: the ledger rejects the
//! offending fill and keeps going, so they only surface inside a
//! [`RejectedFill`](crate::ledger::RejectedFill).

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("invalid order spec for {symbol}: {reason}")]
    InvalidOrderSpec { symbol: String, reason: String },

    #[error("missing price data for {symbol}: {detail}")]
    MissingPriceData { symbol: String, detail: String },

    #[error("insufficient cash for {symbol}: cash after fill {cash_after:.2} is below minimum {min_cash:.2}")]
    InsufficientCash {
        symbol: String,
        cash_after: f64,
        min_cash: f64,
    },

    #[error("short selling disallowed: selling {quantity} {symbol} would leave {resulting} shares")]
    ShortSellingDisallowed {
        symbol: String,
        quantity: u64,
        resulting: i64,
    },

    #[error("invalid bar for {symbol} on {date}: {reason}")]
    InvalidBar {
        symbol: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl KernelError {
    /// Whether this error terminates the day rather than rejecting a single fill.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            KernelError::InsufficientCash { .. } | KernelError::ShortSellingDisallowed { .. }
        )
    }

    /// The symbol the error refers to, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            KernelError::InvalidOrderSpec { symbol, .. }
            | KernelError::MissingPriceData { symbol, .. }
            | KernelError::InsufficientCash { symbol, .. }
            | KernelError::ShortSellingDisallowed { symbol, .. }
            | KernelError::InvalidBar { symbol, .. } => Some(symbol),
            KernelError::InvalidSettings(_) => None,
        }
    }

    pub(crate) fn missing_price(symbol: &str, detail: impl Into<String>) -> Self {
        KernelError::MissingPriceData {
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }
}
