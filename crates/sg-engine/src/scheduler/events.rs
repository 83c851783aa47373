//! Scheduler event stream

use serde::{Deserialize, Serialize};
use sg_plan::{PlanId, WalletAddress};
use std::fmt;

/// Something that happened to an owner's plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    /// Plan owner
    pub owner: WalletAddress,
    /// Plan the event concerns
    pub plan_id: PlanId,
    /// What happened
    pub kind: SchedulerEventKind,
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEventKind {
    /// A plan was generated and stored
    PlanCreated,
    /// The owner approved the plan
    Approved,
    /// Execution began
    Started,
    /// A step was submitted successfully
    StepExecuted {
        /// Step index
        index: usize,
        /// Transaction hash
        hash: String,
    },
    /// Execution was paused
    Paused,
    /// Execution was resumed
    Resumed,
    /// Every step executed
    Completed,
    /// A step submission failed
    Failed {
        /// Step index
        index: usize,
        /// Client-provided reason
        reason: String,
    },
    /// The plan was stopped or rejected and removed
    Stopped,
    /// A step outcome is held in memory until storage accepts it
    PersistenceDeferred {
        /// Step index
        index: usize,
    },
}

impl SchedulerEventKind {
    /// Whether no further step will run without an explicit operation
    #[must_use]
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Failed { .. }
                | Self::Stopped
                | Self::Paused
                | Self::PersistenceDeferred { .. }
        )
    }
}

impl fmt::Display for SchedulerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanCreated => f.write_str("plan created"),
            Self::Approved => f.write_str("approved"),
            Self::Started => f.write_str("started"),
            Self::StepExecuted { index, hash } => write!(f, "step {index} executed ({hash})"),
            Self::Paused => f.write_str("paused"),
            Self::Resumed => f.write_str("resumed"),
            Self::Completed => f.write_str("completed"),
            Self::Failed { index, reason } => write!(f, "step {index} failed: {reason}"),
            Self::Stopped => f.write_str("stopped"),
            Self::PersistenceDeferred { index } => {
                write!(f, "step {index} executed, persistence deferred")
            }
        }
    }
}
