//! Encrypting overlay over a flat key-value backend
//!
//! Every value is serialized to JSON, sealed by [`CryptoBox`], and written under
//! `"{namespace}:{logical key}"`. Reads that fail to decrypt delete the entry and
//! report absence so callers can rebuild state instead of retrying forever.

use crate::backend::KvBackend;
use crate::cipher::CryptoBox;
use crate::error::VaultError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Logical storage keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Connection metadata
    Connection,
    /// The protected signing key
    SigningKey,
    /// Transaction history of one owner
    History(String),
    /// Active execution plan of one owner
    Plan(String),
}

impl StorageKey {
    /// History key for `owner` (case-insensitive)
    #[inline]
    #[must_use]
    pub fn history(owner: &str) -> Self {
        Self::History(owner.to_ascii_lowercase())
    }

    /// Plan key for `owner` (case-insensitive)
    #[inline]
    #[must_use]
    pub fn plan(owner: &str) -> Self {
        Self::Plan(owner.to_ascii_lowercase())
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection"),
            Self::SigningKey => f.write_str("signing_key"),
            Self::History(owner) => write!(f, "history:{owner}"),
            Self::Plan(owner) => write!(f, "plan:{owner}"),
        }
    }
}

/// Transparent encryption over a [`KvBackend`]
#[derive(Debug, Clone)]
pub struct SecureStore {
    namespace: String,
    crypto: CryptoBox,
    backend: Arc<dyn KvBackend>,
}

impl SecureStore {
    /// Create a store writing under `namespace`
    #[must_use]
    pub fn new(namespace: impl Into<String>, crypto: CryptoBox, backend: Arc<dyn KvBackend>) -> Self {
        Self {
            namespace: namespace.into(),
            crypto,
            backend,
        }
    }

    /// Namespace prefix
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying crypto box
    #[inline]
    #[must_use]
    pub fn crypto(&self) -> &CryptoBox {
        &self.crypto
    }

    /// Physical key in the backend for a logical key
    #[must_use]
    pub fn physical_key(&self, key: &StorageKey) -> String {
        format!("{}:{key}", self.namespace)
    }

    /// Serialize, encrypt and write `value`, replacing any prior value
    ///
    /// # Errors
    /// `StorageWrite` if serialization, encryption or the backend write fails. The
    /// previous value, if any, is left intact on error.
    pub fn set_item<T: Serialize + ?Sized>(
        &self,
        key: &StorageKey,
        value: &T,
    ) -> Result<(), VaultError> {
        let physical = self.physical_key(key);
        let write_err = |reason: String| VaultError::StorageWrite {
            key: physical.clone(),
            reason,
        };

        let json = serde_json::to_string(value).map_err(|e| write_err(e.to_string()))?;
        let blob = self
            .crypto
            .encrypt(&json)
            .map_err(|e| write_err(e.to_string()))?;
        self.backend
            .put(&physical, &blob)
            .map_err(|e| write_err(e.to_string()))?;

        tracing::trace!(key = %physical, "stored encrypted entry");
        Ok(())
    }

    /// Read and decrypt the value under `key`
    ///
    /// Returns `None` if absent. A corrupted entry (bad blob, failed tag check,
    /// or undecodable payload) is deleted and reported as `None`.
    ///
    /// # Errors
    /// `StorageRead` if the backend cannot be read; `KeySource` if no passphrase is
    /// available (the entry is kept)
    pub fn get_item<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>, VaultError> {
        let physical = self.physical_key(key);
        let Some(blob) = self
            .backend
            .get(&physical)
            .map_err(|e| VaultError::StorageRead {
                key: physical.clone(),
                reason: e.to_string(),
            })?
        else {
            return Ok(None);
        };

        let decoded = self
            .crypto
            .decrypt(&blob)
            .and_then(|json| serde_json::from_str::<T>(&json).map_err(VaultError::from));

        match decoded {
            Ok(value) => Ok(Some(value)),
            Err(e @ VaultError::KeySource(_)) => Err(e),
            Err(e) => {
                tracing::warn!(key = %physical, error = %e, "discarding corrupted entry");
                if let Err(delete_err) = self.backend.delete(&physical) {
                    tracing::error!(
                        key = %physical,
                        error = %delete_err,
                        "failed to delete corrupted entry"
                    );
                }
                Ok(None)
            }
        }
    }

    /// Whether an entry exists (without decrypting it)
    ///
    /// # Errors
    /// `StorageRead` if the backend cannot be read
    pub fn contains(&self, key: &StorageKey) -> Result<bool, VaultError> {
        let physical = self.physical_key(key);
        self.backend
            .get(&physical)
            .map(|v| v.is_some())
            .map_err(|e| VaultError::StorageRead {
                key: physical,
                reason: e.to_string(),
            })
    }

    /// Remove the entry under `key`
    ///
    /// # Errors
    /// `StorageWrite` if the backend delete fails
    pub fn remove_item(&self, key: &StorageKey) -> Result<(), VaultError> {
        let physical = self.physical_key(key);
        self.backend
            .delete(&physical)
            .map_err(|e| VaultError::StorageWrite {
                key: physical,
                reason: e.to_string(),
            })
    }

    /// Remove every entry under this store's namespace
    ///
    /// Returns the number of entries removed. Keys outside the namespace are
    /// left untouched.
    ///
    /// # Errors
    /// `StorageRead`/`StorageWrite` on backend failure
    pub fn clear_all(&self) -> Result<usize, VaultError> {
        let prefix = format!("{}:", self.namespace);
        let keys = self.backend.keys().map_err(|e| VaultError::StorageRead {
            key: prefix.clone(),
            reason: e.to_string(),
        })?;

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(&prefix)) {
            self.backend
                .delete(key)
                .map_err(|e| VaultError::StorageWrite {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            removed += 1;
        }

        tracing::info!(namespace = %self.namespace, removed, "cleared secure store");
        Ok(removed)
    }

    /// Integrity check: crypto round trip with the current key material
    #[inline]
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        self.crypto.self_test()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::kdf::{KeyDeriver, StaticPassphrase};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    fn store_with(backend: Arc<MemoryBackend>, passphrase: &str) -> SecureStore {
        let crypto = CryptoBox::new(KeyDeriver::new(16), Arc::new(StaticPassphrase::new(passphrase)));
        SecureStore::new("sg", crypto, backend)
    }

    #[test]
    fn physical_keys_are_namespaced() {
        let store = store_with(Arc::new(MemoryBackend::new()), "pw");
        assert_eq!(store.physical_key(&StorageKey::Connection), "sg:connection");
        assert_eq!(store.physical_key(&StorageKey::SigningKey), "sg:signing_key");
        assert_eq!(store.physical_key(&StorageKey::plan("0xABC")), "sg:plan:0xabc");
        assert_eq!(store.physical_key(&StorageKey::history("0xAbC")), "sg:history:0xabc");
    }

    #[test]
    fn set_then_get() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), "pw");
        let record = Record {
            name: "alpha".into(),
            count: 3,
        };

        store.set_item(&StorageKey::Connection, &record).unwrap();
        let raw = backend.get("sg:connection").unwrap().unwrap();
        assert!(!raw.contains("alpha"));

        let loaded: Option<Record> = store.get_item(&StorageKey::Connection).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn absent_is_none() {
        let store = store_with(Arc::new(MemoryBackend::new()), "pw");
        let loaded: Option<Record> = store.get_item(&StorageKey::SigningKey).unwrap();
        assert!(loaded.is_none());
        assert!(!store.contains(&StorageKey::SigningKey).unwrap());
    }

    #[test]
    fn wrong_key_entry_is_deleted() {
        let backend = Arc::new(MemoryBackend::new());
        store_with(backend.clone(), "old")
            .set_item(&StorageKey::SigningKey, "secret")
            .unwrap();

        let store = store_with(backend.clone(), "new");
        let loaded: Option<String> = store.get_item(&StorageKey::SigningKey).unwrap();
        assert!(loaded.is_none());
        assert!(backend.get("sg:signing_key").unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_treated_as_corruption() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), "pw");
        store.set_item(&StorageKey::Connection, "just a string").unwrap();

        let loaded: Option<Record> = store.get_item(&StorageKey::Connection).unwrap();
        assert!(loaded.is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn clear_all_respects_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), "pw");
        store.set_item(&StorageKey::Connection, &1u8).unwrap();
        store.set_item(&StorageKey::plan("0x1"), &2u8).unwrap();
        backend.put("other:thing", "keep").unwrap();

        assert_eq!(store.clear_all().unwrap(), 2);
        assert_eq!(backend.keys().unwrap(), vec!["other:thing".to_string()]);
    }

    #[test]
    fn remove_item() {
        let store = store_with(Arc::new(MemoryBackend::new()), "pw");
        store.set_item(&StorageKey::plan("0x1"), &2u8).unwrap();
        store.remove_item(&StorageKey::plan("0x1")).unwrap();
        assert!(!store.contains(&StorageKey::plan("0x1")).unwrap());
    }

    #[test]
    fn integrity_check_round_trips() {
        assert!(store_with(Arc::new(MemoryBackend::new()), "pw").verify_integrity());
    }
}
