//! Error types for the engine
//!
//! Provides error handling for:
//! - Vault failures (storage, key material)
//! - Plan generation and balance checks
//! - Illegal lifecycle transitions
//! - Step submission failures (terminal for the plan)
//! - Step outcomes that could not yet be persisted

use crate::state::TransitionError;
use sg_plan::{Amount, PlanGenerationError, WalletAddress};
use sg_vault::VaultError;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Vault operation failed
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Plan could not be generated
    #[error("plan generation failed: {0}")]
    Plan(#[from] PlanGenerationError),

    /// Requested stake exceeds the available balance
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Requested total
        requested: Amount,
        /// Available balance
        available: Amount,
    },

    /// No plan stored for the owner
    #[error("no execution plan for {0}")]
    NoPlan(WalletAddress),

    /// Lifecycle transition rejected
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),

    /// A step submission failed; the plan is now failed
    #[error("step {index} failed: {reason}")]
    StepExecution {
        /// Index of the failed step
        index: usize,
        /// Client-provided reason
        reason: String,
    },

    /// An executed step has not been persisted yet
    #[error("executed step {index} for {owner} not yet persisted")]
    PersistencePending {
        /// Plan owner
        owner: WalletAddress,
        /// Index of the executed step
        index: usize,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Check if the operation may succeed when retried unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Vault(e) => e.is_retryable(),
            Self::PersistencePending { .. } => true,
            _ => false,
        }
    }

    /// Check if the error ended the plan (a new plan is required)
    #[inline]
    #[must_use]
    pub fn is_terminal_for_plan(&self) -> bool {
        matches!(self, Self::StepExecution { .. })
    }
}
