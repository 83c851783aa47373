//! Testing utilities for the StakeGuard workspace
//!
//! Shared fixtures: cheap secure stores, a scripted transaction client, and
//! a backend whose writes can be made to fail on demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use sg_engine::{SchedulerConfig, SubmitError, TransactionClient, TxHash, WalletContext};
use sg_plan::{Amount, ExecutionPlan, ExecutionPlanner, WalletAddress};
use sg_vault::{
    BackendError, CryptoBox, KeyDeriver, KeySource, KvBackend, MemoryBackend, SecureStore,
    StaticPassphrase, VaultError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

pub const TEST_NAMESPACE: &str = "sgtest";
pub const TEST_CONTRACT: &str = "0x5a4e000000000000000000000000000000000001";

/// Store with a fixed passphrase and a single KDF iteration
pub fn test_store(backend: Arc<dyn KvBackend>) -> SecureStore {
    let crypto = CryptoBox::new(KeyDeriver::new(1), Arc::new(StaticPassphrase::new("test-pass")));
    SecureStore::new(TEST_NAMESPACE, crypto, backend)
}

pub fn memory_store() -> (SecureStore, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    (test_store(Arc::clone(&backend) as Arc<dyn KvBackend>), backend)
}

pub fn test_context(owner: &str) -> WalletContext {
    WalletContext::new(WalletAddress::new(owner), TEST_CONTRACT)
}

/// Scheduler settings with millisecond persist backoff
pub fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig::new().with_persist_retry(3, 1)
}

pub fn sample_plan(owner: &str, total: u64, steps: u32) -> ExecutionPlan {
    ExecutionPlanner::default()
        .generate(WalletAddress::new(owner), Amount::from_whole(total), steps)
        .unwrap()
}

/// Key source that always fails
#[derive(Debug, Default)]
pub struct UnavailableKeySource;

impl KeySource for UnavailableKeySource {
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        Err(VaultError::KeySource("no key material".into()))
    }

    fn label(&self) -> &'static str {
        "unavailable"
    }
}

/// Memory backend whose writes can be made to fail
#[derive(Debug, Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_next_puts: AtomicUsize,
    fail_all_puts: AtomicBool,
    fail_deletes: AtomicBool,
    put_attempts: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_puts(&self, count: usize) {
        self.fail_next_puts.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_all_puts(&self, fail: bool) {
        self.fail_all_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl KvBackend for FlakyBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_puts.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("disk full".into()));
        }
        let pending = self.fail_next_puts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_puts.store(pending - 1, Ordering::SeqCst);
            return Err(BackendError::Unavailable("transient write failure".into()));
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("disk full".into()));
        }
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        self.inner.keys()
    }
}

/// A call observed by [`ScriptedClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub owner: WalletAddress,
    pub kind: &'static str,
    pub amount: Amount,
}

/// Transaction client with per-submission scripted failures
#[derive(Debug, Default)]
pub struct ScriptedClient {
    failures: parking_lot::Mutex<HashMap<usize, SubmitError>>,
    submissions: parking_lot::Mutex<Vec<Submission>>,
    staked: parking_lot::Mutex<HashMap<WalletAddress, Amount>>,
    latency: parking_lot::Mutex<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the submission with zero-based index `index`
    pub fn fail_at(self, index: usize, reason: &str) -> Self {
        self.failures
            .lock()
            .insert(index, SubmitError::Rejected(reason.to_string()));
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Successful submissions, in order
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn staked(&self, owner: &WalletAddress) -> Amount {
        self.staked.lock().get(owner).copied().unwrap_or_default()
    }

    async fn submit(
        &self,
        ctx: &WalletContext,
        kind: &'static str,
        amount: Amount,
    ) -> Result<TxHash, SubmitError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let index = self.submissions.lock().len();
        if let Some(err) = self.failures.lock().remove(&index) {
            return Err(err);
        }

        {
            let mut staked = self.staked.lock();
            let balance = staked.entry(ctx.owner.clone()).or_default();
            *balance = if kind == "stake" {
                balance.checked_add(amount).unwrap()
            } else {
                balance
                    .checked_sub(amount)
                    .ok_or_else(|| SubmitError::Rejected("unstake exceeds balance".into()))?
            };
        }

        let mut submissions = self.submissions.lock();
        submissions.push(Submission {
            owner: ctx.owner.clone(),
            kind,
            amount,
        });
        Ok(TxHash(format!("0x{}", hex::encode((submissions.len() as u64).to_be_bytes()))))
    }
}

#[async_trait]
impl TransactionClient for ScriptedClient {
    async fn submit_stake(&self, ctx: &WalletContext, amount: Amount) -> Result<TxHash, SubmitError> {
        self.submit(ctx, "stake", amount).await
    }

    async fn submit_unstake(&self, ctx: &WalletContext, amount: Amount) -> Result<TxHash, SubmitError> {
        self.submit(ctx, "unstake", amount).await
    }

    async fn staked_balance(&self, ctx: &WalletContext) -> Result<Amount, SubmitError> {
        Ok(self.staked(&ctx.owner))
    }
}
