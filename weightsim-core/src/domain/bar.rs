//! Bar — one symbol's OHLCV for one trading day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// OHLCV bar for a single symbol on a single day.
///
/// A bar entering the kernel satisfies `low <= {open, close} <= high` with
/// every price finite and positive; see [`Bar::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Cash dividend per share paid on this date; zero on most days.
    #[serde(default)]
    pub dividend: f64,
    /// Last tradable date; execution after it is skipped when delisting is respected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delisted_after: Option<NaiveDate>,
}

/// Named price on a bar, used for execution and valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// `(high + low + close) / 3`, a VWAP proxy.
    Typical,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, KernelError> {
        let bar = Self {
            symbol: symbol.into(),
            date,
            open,
            high,
            low,
            close,
            volume,
            dividend: 0.0,
            delisted_after: None,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Attach a per-share cash dividend, re-validating the bar.
    pub fn with_dividend(mut self, dividend: f64) -> Result<Self, KernelError> {
        self.dividend = dividend;
        self.validate()?;
        Ok(self)
    }

    pub fn with_delisting(mut self, last_tradable: NaiveDate) -> Self {
        self.delisted_after = Some(last_tradable);
        self
    }

    /// The symbol stopped trading before this bar's date.
    pub fn is_delisted(&self) -> bool {
        self.delisted_after.is_some_and(|last| self.date > last)
    }

    /// No trading took place: a zero-volume bar.
    pub fn is_halted(&self) -> bool {
        self.volume == 0.0
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    pub fn is_sane(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check the OHLC range invariant.
    pub fn validate(&self) -> Result<(), KernelError> {
        let fail = |reason: &str| {
            Err(KernelError::InvalidBar {
                symbol: self.symbol.clone(),
                date: self.date,
                reason: reason.to_string(),
            })
        };
        if self.is_void() {
            return fail("NaN price");
        }
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return fail("prices must be finite and positive");
        }
        if self.low > self.high {
            return fail("low above high");
        }
        if self.open < self.low || self.open > self.high {
            return fail("open outside [low, high]");
        }
        if self.close < self.low || self.close > self.high {
            return fail("close outside [low, high]");
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return fail("volume must be finite and non-negative");
        }
        if !self.dividend.is_finite() || self.dividend < 0.0 {
            return fail("dividend must be finite and non-negative");
        }
        Ok(())
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::Typical => self.typical_price(),
        }
    }
}
