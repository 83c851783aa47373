//! Error types for the vault
//!
//! Distinguishes between:
//! - Primitive failures while encrypting (not expected in normal operation)
//! - Corruption or key mismatch while decrypting (recovered by deletion)
//! - Backing medium failures (surfaced to the caller)

/// Main vault error type
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Underlying cipher or key-derivation primitive failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Blob was malformed, truncated, tampered with, or sealed under another key
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Backing store rejected a write or delete
    #[error("storage write failed for '{key}': {reason}")]
    StorageWrite {
        /// Namespaced key being written
        key: String,
        /// Backend-provided reason
        reason: String,
    },

    /// Backing store could not be read
    #[error("storage read failed for '{key}': {reason}")]
    StorageRead {
        /// Namespaced key being read
        key: String,
        /// Backend-provided reason
        reason: String,
    },

    /// Value could not be converted to or from its stored form
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Passphrase source could not produce key material
    #[error("key source unavailable: {0}")]
    KeySource(String),
}

impl VaultError {
    /// Whether this error indicates corrupted or unreadable ciphertext
    #[inline]
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }

    /// Whether the backing medium is at fault and the caller may retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageWrite { .. } | Self::StorageRead { .. })
    }
}

/// Errors raised by a [`KvBackend`](crate::backend::KvBackend)
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// I/O failure on a file-backed store
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend refused the operation
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
