//! Security status surface consumed by the presentation layer

use serde::{Deserialize, Serialize};

/// Derived, never persisted view of the vault's protection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStatus {
    /// Values are being sealed with a working key
    pub encrypted: bool,
    /// Running over an encrypted transport (or locally)
    pub secure_context: bool,
    /// Key material was established for this session
    pub session_active: bool,
    /// Crypto round-trip check succeeded
    pub integrity_verified: bool,
}

impl SecurityStatus {
    /// Compose a status from its three independent inputs
    #[must_use]
    pub fn compute(session_active: bool, secure_context: bool, integrity_verified: bool) -> Self {
        Self {
            encrypted: session_active && integrity_verified,
            secure_context,
            session_active,
            integrity_verified,
        }
    }

    /// Every check passed
    #[inline]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.encrypted && self.secure_context && self.session_active && self.integrity_verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_requires_session_and_integrity() {
        assert!(SecurityStatus::compute(true, true, true).encrypted);
        assert!(!SecurityStatus::compute(false, true, true).encrypted);
        assert!(!SecurityStatus::compute(true, true, false).encrypted);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&SecurityStatus::compute(true, false, true)).unwrap();
        assert!(json.contains("\"secureContext\":false"));
        assert!(json.contains("\"integrityVerified\":true"));
    }

    #[test]
    fn healthy_needs_everything() {
        assert!(SecurityStatus::compute(true, true, true).is_healthy());
        assert!(!SecurityStatus::compute(true, false, true).is_healthy());
    }
}
