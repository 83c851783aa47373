//! In-process chain stand-in for dry runs

use crate::client::{SubmitError, TransactionClient, TxHash, WalletContext};
use async_trait::async_trait;
use rand::RngCore;
use sg_plan::Amount;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Tracks a staked balance in memory and fabricates transaction hashes
#[derive(Debug, Default)]
pub struct SimulatedClient {
    staked: parking_lot::Mutex<Amount>,
    submissions: AtomicUsize,
    fail_at: Option<usize>,
    latency: Duration,
}

impl SimulatedClient {
    /// Create a client that accepts every submission
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the submission with this zero-based index
    #[must_use]
    pub fn with_fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Delay every submission
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Current simulated staked balance
    #[must_use]
    pub fn staked(&self) -> Amount {
        *self.staked.lock()
    }

    /// Number of submissions attempted
    #[must_use]
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    async fn submit(
        &self,
        ctx: &WalletContext,
        apply: impl FnOnce(&mut Amount) -> Result<(), SubmitError>,
    ) -> Result<TxHash, SubmitError> {
        let index = self.submissions.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_at == Some(index) {
            return Err(SubmitError::Rejected(format!("simulated revert at submission {index}")));
        }
        apply(&mut self.staked.lock())?;

        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let hash = TxHash(format!("0x{}", hex::encode(bytes)));
        debug!(owner = %ctx.owner, contract = %ctx.contract, index, hash = %hash, "simulated submission");
        Ok(hash)
    }
}

#[async_trait]
impl TransactionClient for SimulatedClient {
    async fn submit_stake(&self, ctx: &WalletContext, amount: Amount) -> Result<TxHash, SubmitError> {
        self.submit(ctx, |staked| {
            *staked = staked
                .checked_add(amount)
                .ok_or_else(|| SubmitError::Rejected("balance overflow".into()))?;
            Ok(())
        })
        .await
    }

    async fn submit_unstake(
        &self,
        ctx: &WalletContext,
        amount: Amount,
    ) -> Result<TxHash, SubmitError> {
        self.submit(ctx, |staked| {
            *staked = staked
                .checked_sub(amount)
                .ok_or_else(|| SubmitError::Rejected("unstake exceeds staked balance".into()))?;
            Ok(())
        })
        .await
    }

    async fn staked_balance(&self, _ctx: &WalletContext) -> Result<Amount, SubmitError> {
        Ok(self.staked())
    }
}
