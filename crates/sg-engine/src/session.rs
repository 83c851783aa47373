//! Owner session over the secure store
//!
//! Opening a session applies the startup policy: if the crypto self-test
//! fails, every entry in the namespace is wiped before anything is read.

use crate::error::EngineError;
use crate::records::{ConnectionRecord, HistoryEntry};
use crate::repository::{HistoryLog, DEFAULT_HISTORY_CAP};
use sg_plan::WalletAddress;
use sg_vault::{RuntimeEnvironment, SecureStore, SecurityStatus, StorageKey};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Encrypted session state for the connected wallet
#[derive(Debug, Clone)]
pub struct Session {
    store: SecureStore,
    environment: RuntimeEnvironment,
    history: HistoryLog,
}

impl Session {
    /// Open a session, wiping the namespace if the integrity check fails
    ///
    /// # Errors
    /// `Vault` if the wipe itself fails
    pub fn open(store: SecureStore, environment: RuntimeEnvironment) -> Result<Self, EngineError> {
        if store.verify_integrity() {
            info!(namespace = store.namespace(), key_source = store.crypto().source().label(), "session opened");
        } else {
            let removed = store.clear_all()?;
            warn!(namespace = store.namespace(), removed, "integrity check failed, secure storage wiped");
        }
        let history = HistoryLog::new(store.clone(), DEFAULT_HISTORY_CAP);
        Ok(Self {
            store,
            environment,
            history,
        })
    }

    /// With history cap
    #[must_use]
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history = HistoryLog::new(self.store.clone(), cap);
        self
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &SecureStore {
        &self.store
    }

    /// Current protection state
    #[must_use]
    pub fn security_status(&self) -> SecurityStatus {
        let session_active = self.store.crypto().source().passphrase().is_ok();
        SecurityStatus::compute(
            session_active,
            self.environment.is_secure_context(),
            session_active && self.store.verify_integrity(),
        )
    }

    /// Remember the connected wallet
    ///
    /// # Errors
    /// `Vault` on write failure
    pub fn connect(&self, record: &ConnectionRecord) -> Result<(), EngineError> {
        self.store.set_item(&StorageKey::Connection, record)?;
        info!(owner = %record.owner, network = %record.network, "wallet connected");
        Ok(())
    }

    /// Last connected wallet
    ///
    /// # Errors
    /// `Vault` on read failure
    pub fn connection(&self) -> Result<Option<ConnectionRecord>, EngineError> {
        Ok(self.store.get_item(&StorageKey::Connection)?)
    }

    /// Forget the connection and signing key
    ///
    /// # Errors
    /// `Vault` on write failure
    pub fn disconnect(&self) -> Result<(), EngineError> {
        self.store.remove_item(&StorageKey::Connection)?;
        self.store.remove_item(&StorageKey::SigningKey)?;
        info!("wallet disconnected");
        Ok(())
    }

    /// Store the signing key encrypted
    ///
    /// # Errors
    /// `Vault` on write failure
    pub fn store_signing_key(&self, key: &str) -> Result<(), EngineError> {
        self.store.set_item(&StorageKey::SigningKey, key)?;
        Ok(())
    }

    /// Signing key, zeroed on drop
    ///
    /// # Errors
    /// `Vault` on read failure
    pub fn signing_key(&self) -> Result<Option<Zeroizing<String>>, EngineError> {
        Ok(self
            .store
            .get_item::<String>(&StorageKey::SigningKey)?
            .map(Zeroizing::new))
    }

    /// Execution history for `owner`, newest first
    ///
    /// # Errors
    /// `Vault` on read failure
    pub fn history(&self, owner: &WalletAddress) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.history.entries(owner)?)
    }

    /// Prepend an entry to `owner`'s history
    ///
    /// # Errors
    /// `Vault` on read/write failure
    pub fn record_history(&self, owner: &WalletAddress, entry: HistoryEntry) -> Result<(), EngineError> {
        Ok(self.history.record(owner, entry)?)
    }

    /// Remove `owner`'s history
    ///
    /// # Errors
    /// `Vault` on write failure
    pub fn clear_history(&self, owner: &WalletAddress) -> Result<(), EngineError> {
        Ok(self.history.clear(owner)?)
    }
}
