//! StakeGuard Plan - execution plan model and planner
//!
//! Defines the durable plan record driven by the scheduler and the randomized
//! planner that produces it:
//! - Exact fixed-point amounts
//! - Plans, steps and their lifecycle status
//! - Generation of alternating stake/unstake sequences with human-like delays
//!
//! # Example
//!
//! ```rust,ignore
//! use sg_plan::{Amount, ExecutionPlanner, WalletAddress};
//!
//! let planner = ExecutionPlanner::default();
//! let plan = planner.generate(WalletAddress::new("0xabc"), "10".parse()?, 4)?;
//! assert_eq!(plan.transaction_sequence.len(), 4);
//! ```

#![warn(unreachable_pub)]

pub mod amount;
pub mod error;
pub mod plan;
pub mod planner;

pub use amount::{Amount, DECIMALS};
pub use error::{AmountError, PlanGenerationError};
pub use plan::{
    ExecutionPlan, PlanId, PlanStatus, ScheduledTransaction, StepKind, WalletAddress,
};
pub use planner::{
    clamp_even, format_duration, ExecutionPlanner, PlannerConfig, MAX_TRANSACTIONS,
    MIN_TRANSACTIONS, ROUND_PERCENTAGES,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
