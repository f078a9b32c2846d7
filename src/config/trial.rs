//! Trial ledger configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Minimum accepted salt length. The salt is deployment-wide and
/// rotating it orphans existing ledger hashes, so it is set once.
const MIN_SALT_LEN: usize = 16;

/// Trial ledger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrialConfig {
    /// Salt for the one-way email hash stored in the trial ledger
    pub email_hash_salt: SecretString,
}

impl TrialConfig {
    /// Validate trial configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let salt = self.email_hash_salt.expose_secret();
        if salt.is_empty() {
            return Err(ValidationError::MissingRequired("TRIAL_EMAIL_HASH_SALT"));
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(ValidationError::WeakTrialSalt);
        }
        Ok(())
    }
}
