//! Authenticated encryption of opaque values
//!
//! Blob layout: `base64(salt[32] ‖ iv[16] ‖ tag[16] ‖ ciphertext[N])`.
//! Salt and IV are fresh per call, so equal plaintexts never produce equal blobs.

use crate::error::VaultError;
use crate::kdf::{KeyDeriver, KeySource, SALT_LEN};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::sync::Arc;

/// IV length in bytes
pub const IV_LEN: usize = 16;

/// Authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Fixed-size prefix preceding the ciphertext
pub const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// AES-256-GCM with a 128-bit nonce and 128-bit tag
type BlobCipher = AesGcm<Aes256, U16>;

/// Decoded form of a persisted blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureBlob {
    /// KDF salt
    pub salt: [u8; SALT_LEN],
    /// Cipher IV
    pub iv: [u8; IV_LEN],
    /// Authentication tag
    pub tag: [u8; TAG_LEN],
    /// Encrypted payload
    pub ciphertext: Vec<u8>,
}

impl SecureBlob {
    /// Concatenate segments in order and base64-encode
    #[must_use]
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&self.iv);
        raw.extend_from_slice(&self.tag);
        raw.extend_from_slice(&self.ciphertext);
        STANDARD.encode(raw)
    }

    /// Decode and split by fixed segment lengths
    ///
    /// # Errors
    /// `VaultError::Decryption` if the input is not base64 or is shorter than the header
    pub fn decode(encoded: &str) -> Result<Self, VaultError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::Decryption(format!("invalid encoding: {e}")))?;

        if raw.len() < HEADER_LEN {
            return Err(VaultError::Decryption(format!(
                "blob truncated: {} bytes, header needs {HEADER_LEN}",
                raw.len()
            )));
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut blob = Self {
            salt: [0u8; SALT_LEN],
            iv: [0u8; IV_LEN],
            tag: [0u8; TAG_LEN],
            ciphertext: ciphertext.to_vec(),
        };
        blob.salt.copy_from_slice(salt);
        blob.iv.copy_from_slice(iv);
        blob.tag.copy_from_slice(tag);
        Ok(blob)
    }
}

/// Symmetric authenticated encryption keyed by a [`KeySource`]
#[derive(Debug, Clone)]
pub struct CryptoBox {
    deriver: KeyDeriver,
    source: Arc<dyn KeySource>,
}

impl CryptoBox {
    /// Create a box deriving keys from `source`
    #[inline]
    #[must_use]
    pub fn new(deriver: KeyDeriver, source: Arc<dyn KeySource>) -> Self {
        Self { deriver, source }
    }

    /// Key source backing this box
    #[inline]
    #[must_use]
    pub fn source(&self) -> &Arc<dyn KeySource> {
        &self.source
    }

    fn cipher_for(&self, salt: &[u8; SALT_LEN]) -> Result<BlobCipher, VaultError> {
        let passphrase = self.source.passphrase()?;
        let key = self.deriver.derive(&passphrase, salt);
        BlobCipher::new_from_slice(key.as_ref())
            .map_err(|e| VaultError::Encryption(format!("key init failed: {e}")))
    }

    /// Encrypt `plaintext` into an encoded blob
    ///
    /// # Errors
    /// `VaultError::Encryption` on primitive failure, `VaultError::KeySource` if no
    /// passphrase is available
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let cipher = self.cipher_for(&salt)?;
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| VaultError::Encryption(format!("seal failed: {e}")))?;

        let mut blob = SecureBlob {
            salt,
            iv,
            tag: [0u8; TAG_LEN],
            ciphertext: buffer,
        };
        blob.tag.copy_from_slice(tag.as_slice());
        Ok(blob.encode())
    }

    /// Decrypt an encoded blob, verifying its tag
    ///
    /// # Errors
    /// `VaultError::Decryption` if the blob is malformed, tampered with, or was
    /// sealed under a different key; `VaultError::KeySource` if no passphrase is
    /// available (the blob itself may be fine)
    pub fn decrypt(&self, encoded: &str) -> Result<String, VaultError> {
        let blob = SecureBlob::decode(encoded)?;
        let cipher = self.cipher_for(&blob.salt)?;

        let mut buffer = blob.ciphertext;
        cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&blob.iv),
                b"",
                &mut buffer,
                Tag::<U16>::from_slice(&blob.tag),
            )
            .map_err(|_| {
                VaultError::Decryption("authentication failed (tampered or wrong key)".into())
            })?;

        String::from_utf8(buffer)
            .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".into()))
    }

    /// Round-trip a random marker; any error counts as failure
    #[must_use]
    pub fn self_test(&self) -> bool {
        let mut marker = [0u8; 16];
        rand::rng().fill_bytes(&mut marker);
        let marker = format!("integrity-check-{}", hex::encode(marker));

        match self.encrypt(&marker).and_then(|blob| self.decrypt(&blob)) {
            Ok(decrypted) => decrypted == marker,
            Err(e) => {
                tracing::warn!(error = %e, "crypto self-test failed");
                false
            }
        }
    }
}
