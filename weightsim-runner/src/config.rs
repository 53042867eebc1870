//! Serializable run configuration.
//!
//! A run is described by one TOML file:
//!
//! ```toml
//! [run]
//! name = "equal_weight_demo"
//! data = "prices.csv"
//! initial_cash = 100000.0
//!
//! [kernel]
//! seed = 42
//! slippage = { type = "FIXED_BPS", bps = 5.0 }
//!
//! [strategy]
//! type = "EQUAL_WEIGHT"
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use weightsim_core::KernelSettings;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub run: RunSection,
    #[serde(default)]
    pub kernel: KernelSettings,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSection {
    pub name: String,

    /// Long-format CSV with `date,symbol,open,high,low,close,volume`.
    pub data: PathBuf,

    /// First trading day (inclusive). Defaults to the first date in the data.
    #[serde(default)]
    pub start: Option<NaiveDate>,

    /// Last trading day (inclusive). Defaults to the last date in the data.
    #[serde(default)]
    pub end: Option<NaiveDate>,

    /// Restrict the data to these symbols. Empty means every symbol in the file.
    #[serde(default)]
    pub universe: Vec<String>,

    pub initial_cash: f64,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Built-in strategy selection (serializable enum).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    /// 1/n of `gross` on each listed symbol (all symbols if empty) that traded the day before.
    EqualWeight {
        #[serde(default)]
        symbols: Vec<String>,
        #[serde(default = "default_gross")]
        gross: f64,
    },

    /// Equal weight across the `count` highest-volume symbols of the previous day.
    /// New positions are entered with a limit buy `discount_pct` below the previous close.
    TopVolumeLimit {
        count: usize,
        discount_pct: f64,
        #[serde(default = "default_gross")]
        gross: f64,
    },

    /// Fully invested in one symbol for the whole run.
    BuyAndHold { symbol: String },
}

fn default_gross() -> f64 {
    1.0
}

impl RunConfig {
    /// Parse a config from TOML text. Relative paths stay relative.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. Relative `data` and `output_dir` paths resolve
    /// against the config file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.run.data = resolve(base, &config.run.data);
            config.run.output_dir = resolve(base, &config.run.output_dir);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.name.trim().is_empty() {
            return Err(ConfigError::Invalid("run.name must not be empty".into()));
        }
        if !self.run.initial_cash.is_finite() || self.run.initial_cash <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "run.initial_cash must be positive, got {}",
                self.run.initial_cash
            )));
        }
        if let (Some(start), Some(end)) = (self.run.start, self.run.end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "run.start ({start}) is after run.end ({end})"
                )));
            }
        }
        self.kernel
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.strategy.validate()
    }

    /// Deterministic hash ID for this configuration.
    ///
    /// Two identical configs share a RunId, so artifacts land in the same place.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::EqualWeight { .. } => "equal_weight",
            StrategyConfig::TopVolumeLimit { .. } => "top_volume_limit",
            StrategyConfig::BuyAndHold { .. } => "buy_and_hold",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let check_gross = |gross: f64| {
            if gross.is_finite() && gross > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "strategy.gross must be positive, got {gross}"
                )))
            }
        };
        match self {
            StrategyConfig::EqualWeight { gross, .. } => check_gross(*gross),
            StrategyConfig::TopVolumeLimit {
                count,
                discount_pct,
                gross,
            } => {
                if *count == 0 {
                    return Err(ConfigError::Invalid("strategy.count must be at least 1".into()));
                }
                if !(0.0..100.0).contains(discount_pct) {
                    return Err(ConfigError::Invalid(format!(
                        "strategy.discount_pct must be in [0, 100), got {discount_pct}"
                    )));
                }
                check_gross(*gross)
            }
            StrategyConfig::BuyAndHold { symbol } => {
                if symbol.is_empty() {
                    return Err(ConfigError::Invalid("strategy.symbol must not be empty".into()));
                }
                Ok(())
            }
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
