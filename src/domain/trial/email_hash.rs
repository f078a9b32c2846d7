//! Salted one-way hash of an email address.
//!
//! The ledger never stores raw emails. The hash is salted with a
//! deployment-wide secret so a leaked ledger cannot be joined against
//! other datasets by rainbow table.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded salted SHA-256 of a normalized email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailHash(String);

impl EmailHash {
    /// Computes the hash for an email address.
    ///
    /// The address is normalized (trimmed, lowercased) first so that
    /// display-form variants of the same mailbox collapse to one entry.
    pub fn compute(email: &str, salt: &str) -> Self {
        let normalized = email.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-computed hex digest (e.g. read from the store).
    pub fn from_hex(hex_digest: impl Into<String>) -> Self {
        Self(hex_digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
