//! Execution: turns a day's orders into fills
//!
//! - **Engine**: per-order matching against the day's bar
//! - **Slippage**: directional price adjustment for market orders
//! - **Commission**: fee schedule charged on every fill
//! - **Participation**: halted-bar and ADV participation limits

pub mod commission;
pub mod engine;
pub mod participation;
pub mod slippage;

pub use commission::CommissionSchedule;
pub use engine::{ExecutionEngine, ExecutionResult, SkipReason, SkippedOrder};
pub use participation::ExecutionLimits;
pub use slippage::{
    FixedBpsSlippage, NoSlippage, RandomBpsSlippage, SlippageConfig, SlippageModel,
    SquareRootImpact,
};
