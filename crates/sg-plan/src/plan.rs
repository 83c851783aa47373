//! Execution plan model
//!
//! A plan is the durable record of a multi-step stake/unstake sequence and its
//! progress. It is always persisted and rewritten as a whole.

use crate::amount::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique plan identifier (ULID, so creation-time ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Ulid);

impl PlanId {
    /// Generate new plan ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning identity of a plan, its history, and its storage partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Wrap an address, normalized to lowercase
    #[must_use]
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_lowercase())
    }

    /// Address as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Lifecycle status of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Generated, waiting for the owner
    PendingApproval,
    /// Approved, not yet started
    Approved,
    /// Timer armed or step in flight
    Executing,
    /// Interrupted; progress retained
    Paused,
    /// Every step executed
    Completed,
    /// A submission failed
    Failed,
}

impl PlanStatus {
    /// Terminal states accept no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Stake a fixed amount
    Stake {
        /// Amount to stake
        amount: Amount,
    },
    /// Unstake a percentage of the balance staked at execution time
    Unstake {
        /// Percentage, 10..=90
        percentage: u8,
    },
}

impl StepKind {
    /// Short label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stake { .. } => "stake",
            Self::Unstake { .. } => "unstake",
        }
    }

    /// Whether this is a stake step
    #[inline]
    #[must_use]
    pub fn is_stake(&self) -> bool {
        matches!(self, Self::Stake { .. })
    }
}

/// One scheduled step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTransaction {
    /// Stake or unstake
    #[serde(flatten)]
    pub kind: StepKind,
    /// Seconds to wait before executing
    pub delay_secs: u64,
    /// Offset from plan start, sum of delays up to and including this step
    pub execute_at_secs: u64,
    /// Whether the step has been executed
    #[serde(default)]
    pub executed: bool,
    /// Transaction hash, once executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Execution time, once executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    /// Amount actually submitted (resolved percentage for unstakes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_amount: Option<Amount>,
}

impl ScheduledTransaction {
    /// Create a pending step
    #[inline]
    #[must_use]
    pub fn new(kind: StepKind, delay_secs: u64, execute_at_secs: u64) -> Self {
        Self {
            kind,
            delay_secs,
            execute_at_secs,
            executed: false,
            hash: None,
            executed_at: None,
            resolved_amount: None,
        }
    }
}

/// Durable scheduling state for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Plan identifier
    pub id: PlanId,
    /// Owning identity
    pub owner: WalletAddress,
    /// Sum of stake steps
    pub total_stake: Amount,
    /// Step count (even, 2..=20)
    pub num_transactions: u8,
    /// Ordered steps
    pub transaction_sequence: Vec<ScheduledTransaction>,
    /// Lifecycle status
    pub status: PlanStatus,
    /// Index of the next step to execute
    pub current_index: usize,
    /// Informational gas estimate
    pub estimated_gas_cost: Amount,
    /// Sum of delays formatted as minutes and seconds
    pub total_execution_time: String,
    /// Sum of delays in seconds
    pub total_delay_secs: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Failure reason when status is failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ExecutionPlan {
    /// Step at `current_index`, if any remain
    #[inline]
    #[must_use]
    pub fn current_step(&self) -> Option<&ScheduledTransaction> {
        self.transaction_sequence.get(self.current_index)
    }

    /// Number of steps not yet executed
    #[inline]
    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        self.transaction_sequence.len().saturating_sub(self.current_index)
    }

    /// Number of executed steps
    #[must_use]
    pub fn executed_count(&self) -> usize {
        self.transaction_sequence.iter().filter(|s| s.executed).count()
    }

    /// Sum of the stake step amounts
    #[must_use]
    pub fn stake_sum(&self) -> Option<Amount> {
        let stakes: Vec<Amount> = self
            .transaction_sequence
            .iter()
            .filter_map(|s| match s.kind {
                StepKind::Stake { amount } => Some(amount),
                StepKind::Unstake { .. } => None,
            })
            .collect();
        Amount::checked_sum(&stakes)
    }

    /// Whether the plan can still make progress
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
