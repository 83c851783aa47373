//! StakeGuard Vault - encrypted client-side storage
//!
//! Provides:
//! - Salted password-based key derivation from a pluggable passphrase source
//! - Authenticated encryption of opaque values into self-describing blobs
//! - A namespaced key-value overlay that encrypts on write and self-heals on
//!   corrupted reads
//! - The derived security status surface
//!
//! # Example
//!
//! ```rust,ignore
//! use sg_vault::prelude::*;
//! use std::sync::Arc;
//!
//! let crypto = CryptoBox::new(KeyDeriver::default(), Arc::new(StaticPassphrase::new("pw")));
//! let store = SecureStore::new("stakeguard", crypto, Arc::new(MemoryBackend::new()));
//!
//! store.set_item(&StorageKey::SigningKey, "0xdeadbeef")?;
//! let key: Option<String> = store.get_item(&StorageKey::SigningKey)?;
//! ```

#![warn(unreachable_pub)]

pub mod backend;
pub mod cipher;
pub mod config;
pub mod env;
pub mod error;
pub mod kdf;
pub mod status;
pub mod store;

pub use backend::{FileBackend, KvBackend, MemoryBackend};
pub use cipher::{CryptoBox, SecureBlob, HEADER_LEN, IV_LEN, TAG_LEN};
pub use config::{KeySourceKind, VaultConfig};
pub use env::RuntimeEnvironment;
pub use error::{BackendError, VaultError};
pub use kdf::{
    EnvironmentFingerprint, InstallationSecret, KeyDeriver, KeySource, StaticPassphrase, KEY_LEN,
    SALT_LEN,
};
pub use status::SecurityStatus;
pub use store::{SecureStore, StorageKey};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the vault
    pub use crate::{
        CryptoBox, KeyDeriver, KeySource, KvBackend, MemoryBackend, SecureStore,
        SecurityStatus, StaticPassphrase, StorageKey, VaultError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
