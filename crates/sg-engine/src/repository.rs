//! Typed access to plans and history in the secure store
//!
//! At most one plan exists per owner; writing a plan replaces the previous
//! one whole.

use crate::records::HistoryEntry;
use sg_plan::{ExecutionPlan, PlanId, WalletAddress};
use sg_vault::{SecureStore, StorageKey, VaultError};
use tracing::debug;

/// Default number of history entries kept per owner
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// Per-owner plan records
#[derive(Debug, Clone)]
pub struct PlanRepository {
    store: SecureStore,
}

impl PlanRepository {
    /// Create over `store`
    #[must_use]
    pub fn new(store: SecureStore) -> Self {
        Self { store }
    }

    fn key(owner: &WalletAddress) -> StorageKey {
        StorageKey::plan(owner.as_str())
    }

    /// Whether a plan record exists for `owner`
    ///
    /// # Errors
    /// Backend read failure
    pub fn exists(&self, owner: &WalletAddress) -> Result<bool, VaultError> {
        self.store.contains(&Self::key(owner))
    }

    /// Load the plan for `owner`; a corrupted record reads as absent
    ///
    /// # Errors
    /// Backend read or key-source failure
    pub fn load(&self, owner: &WalletAddress) -> Result<Option<ExecutionPlan>, VaultError> {
        self.store.get_item(&Self::key(owner))
    }

    /// Persist `plan` under its owner
    ///
    /// # Errors
    /// `StorageWrite` on any failure; the previous record is left untouched
    pub fn save(&self, plan: &ExecutionPlan) -> Result<(), VaultError> {
        self.store.set_item(&Self::key(&plan.owner), plan)
    }

    /// Persist `plan`, returning the id of the plan it displaced
    ///
    /// # Errors
    /// Same as [`PlanRepository::save`]
    pub fn replace(&self, plan: &ExecutionPlan) -> Result<Option<PlanId>, VaultError> {
        let previous = self.load(&plan.owner)?.map(|p| p.id);
        self.save(plan)?;
        if let Some(id) = previous {
            debug!(owner = %plan.owner, replaced = %id, plan_id = %plan.id, "replaced plan");
        }
        Ok(previous)
    }

    /// Remove the plan for `owner`
    ///
    /// # Errors
    /// Backend write failure
    pub fn delete(&self, owner: &WalletAddress) -> Result<(), VaultError> {
        self.store.remove_item(&Self::key(owner))
    }
}

/// Newest-first, bounded execution history per owner
#[derive(Debug, Clone)]
pub struct HistoryLog {
    store: SecureStore,
    cap: usize,
}

impl HistoryLog {
    /// Create over `store`, keeping at most `cap` entries per owner
    #[must_use]
    pub fn new(store: SecureStore, cap: usize) -> Self {
        Self { store, cap }
    }

    /// Maximum entries kept
    #[inline]
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Entries for `owner`, newest first
    ///
    /// # Errors
    /// Backend read or key-source failure
    pub fn entries(&self, owner: &WalletAddress) -> Result<Vec<HistoryEntry>, VaultError> {
        Ok(self
            .store
            .get_item(&StorageKey::history(owner.as_str()))?
            .unwrap_or_default())
    }

    /// Prepend `entry`, dropping the oldest beyond the cap
    ///
    /// # Errors
    /// Backend read/write failure
    pub fn record(&self, owner: &WalletAddress, entry: HistoryEntry) -> Result<(), VaultError> {
        let mut entries = self.entries(owner)?;
        entries.insert(0, entry);
        entries.truncate(self.cap);
        self.store
            .set_item(&StorageKey::history(owner.as_str()), &entries)
    }

    /// Remove all entries for `owner`
    ///
    /// # Errors
    /// Backend write failure
    pub fn clear(&self, owner: &WalletAddress) -> Result<(), VaultError> {
        self.store.remove_item(&StorageKey::history(owner.as_str()))
    }
}
