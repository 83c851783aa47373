//! Key derivation and passphrase sources
//!
//! A passphrase comes from a [`KeySource`]; [`KeyDeriver`] stretches it with a
//! per-blob random salt into a 32-byte symmetric key.

use crate::env::RuntimeEnvironment;
use crate::error::VaultError;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// Salt length in bytes
pub const SALT_LEN: usize = 32;

/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Length of an installation secret in bytes
const INSTALLATION_SECRET_LEN: usize = 32;

/// Salted password-based key derivation (PBKDF2-HMAC-SHA256)
///
/// Same password and salt always yield the same key; different salts yield
/// unlinkable keys.
#[derive(Debug, Clone, Copy)]
pub struct KeyDeriver {
    iterations: u32,
}

impl KeyDeriver {
    /// Create deriver with the given iteration count (minimum 1)
    #[inline]
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Iteration count in use
    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive a 32-byte key from password and salt
    #[must_use]
    pub fn derive(&self, password: &[u8], salt: &[u8; SALT_LEN]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, self.iterations, key.as_mut());
        key
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

/// Provider of the passphrase fed into [`KeyDeriver`]
pub trait KeySource: Send + Sync + Debug {
    /// Passphrase bytes; must be stable for the lifetime of the source
    ///
    /// # Errors
    /// Returns `VaultError::KeySource` when the material cannot be produced
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, VaultError>;

    /// Short label for logs and status output
    fn label(&self) -> &'static str;
}

/// Passphrase derived from runtime environment characteristics
///
/// The characteristics are observable and low-entropy; prefer
/// [`InstallationSecret`] where a file can be persisted.
#[derive(Debug, Clone)]
pub struct EnvironmentFingerprint {
    environment: RuntimeEnvironment,
    time_bucket: u64,
}

impl EnvironmentFingerprint {
    /// Fingerprint the given environment, bucketing the current time by `window_secs`
    ///
    /// The bucket is fixed at construction so derivation stays deterministic for
    /// the whole session.
    #[must_use]
    pub fn new(environment: RuntimeEnvironment, window_secs: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self::with_time_bucket(environment, now / window_secs.max(1))
    }

    /// Fingerprint with an explicit time bucket
    #[inline]
    #[must_use]
    pub fn with_time_bucket(environment: RuntimeEnvironment, time_bucket: u64) -> Self {
        Self {
            environment,
            time_bucket,
        }
    }

    /// Environment being fingerprinted
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &RuntimeEnvironment {
        &self.environment
    }

    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for component in self.environment.components() {
            hasher.update(component.as_bytes());
            hasher.update(b"|");
        }
        hasher.update(self.time_bucket.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl KeySource for EnvironmentFingerprint {
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        Ok(Zeroizing::new(self.digest().into_bytes()))
    }

    fn label(&self) -> &'static str {
        "fingerprint"
    }
}

/// Random per-installation secret, generated once and persisted to a file
#[derive(Debug)]
pub struct InstallationSecret {
    path: PathBuf,
    cached: Mutex<Option<Zeroizing<Vec<u8>>>>,
}

impl InstallationSecret {
    /// Use (or create on first access) the secret stored at `path`
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    /// Location of the secret file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_or_create(&self) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        match std::fs::read_to_string(&self.path) {
            Ok(encoded) => {
                let encoded = Zeroizing::new(encoded);
                let bytes = hex::decode(encoded.trim()).map_err(|e| {
                    VaultError::KeySource(format!("{}: {e}", self.path.display()))
                })?;
                if bytes.len() != INSTALLATION_SECRET_LEN {
                    return Err(VaultError::KeySource(format!(
                        "{}: expected {INSTALLATION_SECRET_LEN} bytes, found {}",
                        self.path.display(),
                        bytes.len()
                    )));
                }
                Ok(Zeroizing::new(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.create(),
            Err(e) => Err(VaultError::KeySource(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    fn create(&self) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let mut secret = Zeroizing::new(vec![0u8; INSTALLATION_SECRET_LEN]);
        rand::rng().fill_bytes(secret.as_mut_slice());

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let to_key_err = |e: std::io::Error| {
            VaultError::KeySource(format!("{}: {e}", self.path.display()))
        };

        std::fs::create_dir_all(dir).map_err(to_key_err)?;
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(to_key_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(to_key_err)?;
        }
        let encoded = Zeroizing::new(hex::encode(secret.as_slice()));
        file.write_all(encoded.as_bytes()).map_err(to_key_err)?;
        file.as_file().sync_all().map_err(to_key_err)?;
        file.persist(&self.path)
            .map_err(|e| to_key_err(e.error))?;

        tracing::info!(path = %self.path.display(), "generated installation secret");
        Ok(secret)
    }
}

impl KeySource for InstallationSecret {
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let mut cached = self.cached.lock();
        if let Some(secret) = cached.as_ref() {
            return Ok(secret.clone());
        }
        let secret = self.load_or_create()?;
        *cached = Some(secret.clone());
        Ok(secret)
    }

    fn label(&self) -> &'static str {
        "installation"
    }
}

/// Fixed passphrase supplied by the embedding application
#[derive(Clone)]
pub struct StaticPassphrase(Zeroizing<Vec<u8>>);

impl StaticPassphrase {
    /// Wrap the given passphrase
    #[inline]
    #[must_use]
    pub fn new(passphrase: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(passphrase.as_ref().to_vec()))
    }
}

impl Debug for StaticPassphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticPassphrase(..)")
    }
}

impl KeySource for StaticPassphrase {
    fn passphrase(&self) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        Ok(self.0.clone())
    }

    fn label(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let deriver = KeyDeriver::new(10);
        let salt = [7u8; SALT_LEN];
        assert_eq!(*deriver.derive(b"pw", &salt), *deriver.derive(b"pw", &salt));
    }

    #[test]
    fn derive_differs_per_salt_and_password() {
        let deriver = KeyDeriver::new(10);
        let a = deriver.derive(b"pw", &[1u8; SALT_LEN]);
        let b = deriver.derive(b"pw", &[2u8; SALT_LEN]);
        let c = deriver.derive(b"other", &[1u8; SALT_LEN]);
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn zero_iterations_clamped() {
        assert_eq!(KeyDeriver::new(0).iterations(), 1);
    }

    #[test]
    fn fingerprint_stable_within_bucket() {
        let env = RuntimeEnvironment::new().with_user_agent("agent/1.0");
        let a = EnvironmentFingerprint::with_time_bucket(env.clone(), 42);
        let b = EnvironmentFingerprint::with_time_bucket(env.clone(), 42);
        let c = EnvironmentFingerprint::with_time_bucket(env, 43);

        assert_eq!(*a.passphrase().unwrap(), *b.passphrase().unwrap());
        assert_ne!(*a.passphrase().unwrap(), *c.passphrase().unwrap());
    }

    #[test]
    fn fingerprint_of_empty_environment_does_not_fail() {
        let fp = EnvironmentFingerprint::new(RuntimeEnvironment::new(), 0);
        assert_eq!(fp.passphrase().unwrap().len(), 64);
    }

    #[test]
    fn installation_secret_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("secret");

        let first = InstallationSecret::new(&path).passphrase().unwrap();
        assert!(path.exists());
        let second = InstallationSecret::new(&path).passphrase().unwrap();
        assert_eq!(*first, *second);
        assert_eq!(first.len(), INSTALLATION_SECRET_LEN);
    }

    #[test]
    fn installation_secret_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "not-hex").unwrap();

        let err = InstallationSecret::new(&path).passphrase().unwrap_err();
        assert!(matches!(err, VaultError::KeySource(_)));
    }
}
