//! Chain submission boundary
//!
//! The scheduler never talks to a chain directly; it calls a
//! [`TransactionClient`] with an explicit [`WalletContext`] so that submitting
//! on behalf of an identity other than the plan owner is impossible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sg_plan::{Amount, WalletAddress};
use std::fmt;

/// Identity and target contract for a submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletContext {
    /// Signing identity, also the plan owner
    pub owner: WalletAddress,
    /// Staking contract address
    pub contract: String,
}

impl WalletContext {
    /// Create a context
    #[must_use]
    pub fn new(owner: WalletAddress, contract: impl Into<String>) -> Self {
        Self {
            owner,
            contract: contract.into(),
        }
    }
}

/// Hash of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    /// Hash as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission failures reported by a client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Transaction was rejected or reverted
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Client could not reach the chain
    #[error("client unavailable: {0}")]
    Unavailable(String),

    /// Nothing staked to unstake from
    #[error("nothing staked")]
    NothingStaked,
}

/// Submits staking transactions on behalf of a wallet
#[async_trait]
pub trait TransactionClient: Send + Sync {
    /// Stake `amount`
    ///
    /// # Errors
    /// Any submission failure; the scheduler fails the plan on error
    async fn submit_stake(&self, ctx: &WalletContext, amount: Amount) -> Result<TxHash, SubmitError>;

    /// Unstake `amount`
    ///
    /// # Errors
    /// Any submission failure; the scheduler fails the plan on error
    async fn submit_unstake(&self, ctx: &WalletContext, amount: Amount)
        -> Result<TxHash, SubmitError>;

    /// Balance currently staked by `ctx.owner`
    ///
    /// # Errors
    /// Query failure
    async fn staked_balance(&self, ctx: &WalletContext) -> Result<Amount, SubmitError>;
}
