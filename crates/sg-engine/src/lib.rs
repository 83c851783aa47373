//! StakeGuard Engine - durable multi-step staking execution
//!
//! Ties the vault and the planner together:
//! - A per-owner scheduler that runs plans step by step with cancellable timers
//! - A single transition function validating every lifecycle change
//! - Encrypted plan, history and credential records
//! - The session surface (startup integrity policy, security status)
//!
//! # Example
//!
//! ```rust,ignore
//! use sg_engine::prelude::*;
//! use std::sync::Arc;
//!
//! let scheduler = ExecutionScheduler::new(
//!     store,
//!     Arc::new(SimulatedClient::new()),
//!     ExecutionPlanner::default(),
//!     SchedulerConfig::default(),
//! );
//! let ctx = WalletContext::new(WalletAddress::new("0xabc"), "0xstaking");
//!
//! scheduler.create_plan(&ctx, PlanRequest::new("10".parse()?, 4)).await?;
//! scheduler.approve(&ctx).await?;
//! scheduler.start(&ctx).await?;
//! scheduler.join(&ctx).await;
//! ```

#![warn(unreachable_pub)]

pub mod client;
pub mod config;
pub mod error;
pub mod records;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod state;

pub use client::{SubmitError, TransactionClient, TxHash, WalletContext};
pub use config::{EngineConfig, SchedulerConfig, StorageConfig};
pub use error::EngineError;
pub use records::{ConnectionRecord, HistoryEntry};
pub use repository::{HistoryLog, PlanRepository, DEFAULT_HISTORY_CAP};
pub use scheduler::{ExecutionScheduler, PlanRequest, SchedulerEvent, SchedulerEventKind};
pub use session::Session;
pub use sim::SimulatedClient;
pub use state::{PlanEvent, TransitionError};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving plans
    pub use crate::{
        EngineConfig, EngineError, ExecutionScheduler, PlanRequest, SchedulerConfig,
        SchedulerEvent, SchedulerEventKind, Session, SimulatedClient, TransactionClient,
        WalletContext,
    };
    pub use sg_plan::{Amount, ExecutionPlan, ExecutionPlanner, PlanStatus, WalletAddress};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
