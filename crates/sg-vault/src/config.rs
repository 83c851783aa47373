//! Vault configuration

use crate::backend::KvBackend;
use crate::cipher::CryptoBox;
use crate::env::RuntimeEnvironment;
use crate::error::VaultError;
use crate::kdf::{EnvironmentFingerprint, InstallationSecret, KeyDeriver, KeySource, DEFAULT_ITERATIONS};
use crate::store::SecureStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the vault passphrase comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySourceKind {
    /// Random secret persisted once per installation
    #[default]
    Installation,
    /// Hash of runtime environment characteristics
    Fingerprint,
}

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Prefix for every physical key
    pub namespace: String,
    /// PBKDF2 iteration count
    pub kdf_iterations: u32,
    /// Passphrase source
    pub key_source: KeySourceKind,
    /// Location of the installation secret
    pub secret_path: PathBuf,
    /// Width of the fingerprint time bucket in seconds
    pub fingerprint_window_secs: u64,
}

impl VaultConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// With KDF iteration count
    #[inline]
    #[must_use]
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// With key source
    #[inline]
    #[must_use]
    pub fn with_key_source(mut self, kind: KeySourceKind) -> Self {
        self.key_source = kind;
        self
    }

    /// With installation secret path
    #[inline]
    #[must_use]
    pub fn with_secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.secret_path = path.into();
        self
    }

    /// Build the configured key source
    #[must_use]
    pub fn key_source(&self, environment: &RuntimeEnvironment) -> Arc<dyn KeySource> {
        match self.key_source {
            KeySourceKind::Installation => Arc::new(InstallationSecret::new(&self.secret_path)),
            KeySourceKind::Fingerprint => Arc::new(EnvironmentFingerprint::new(
                environment.clone(),
                self.fingerprint_window_secs,
            )),
        }
    }

    /// Assemble a secure store over `backend`
    ///
    /// # Errors
    /// `KeySource` if the configured source cannot produce key material
    pub fn open_store(
        &self,
        environment: &RuntimeEnvironment,
        backend: Arc<dyn KvBackend>,
    ) -> Result<SecureStore, VaultError> {
        let source = self.key_source(environment);
        // Fail early rather than on the first write
        source.passphrase()?;
        let crypto = CryptoBox::new(KeyDeriver::new(self.kdf_iterations), source);
        Ok(SecureStore::new(self.namespace.clone(), crypto, backend))
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            namespace: "stakeguard".to_string(),
            kdf_iterations: DEFAULT_ITERATIONS,
            key_source: KeySourceKind::default(),
            secret_path: PathBuf::from(".stakeguard/installation.key"),
            fingerprint_window_secs: 24 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::store::StorageKey;

    #[test]
    fn defaults() {
        let config = VaultConfig::new();
        assert_eq!(config.namespace, "stakeguard");
        assert_eq!(config.kdf_iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.key_source, KeySourceKind::Installation);
    }

    #[test]
    fn partial_config_deserializes() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"namespace":"x","key_source":"fingerprint"}"#).unwrap();
        assert_eq!(config.namespace, "x");
        assert_eq!(config.key_source, KeySourceKind::Fingerprint);
        assert_eq!(config.kdf_iterations, DEFAULT_ITERATIONS);
    }

    #[test]
    fn open_store_with_installation_secret() {
        let dir = tempfile::tempdir().unwrap();
        let config = VaultConfig::new()
            .with_kdf_iterations(8)
            .with_secret_path(dir.path().join("key"));

        let store = config
            .open_store(&RuntimeEnvironment::new(), Arc::new(MemoryBackend::new()))
            .unwrap();
        store.set_item(&StorageKey::SigningKey, "k").unwrap();
        assert_eq!(
            store.get_item::<String>(&StorageKey::SigningKey).unwrap().as_deref(),
            Some("k")
        );
        assert_eq!(store.crypto().source().label(), "installation");
    }
}
