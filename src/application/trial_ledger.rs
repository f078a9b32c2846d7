//! Trial ledger service.
//!
//! The fraud-prevention component: answers "has this identity already
//! consumed a trial" and records first trial starts. Lookups go by user
//! id first (a hit there is re-validation, not abuse), then by salted
//! email hash (a hit there is a different identity reusing an email
//! that already consumed a trial).

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::trial::{EmailHash, TrialHistory, TrialLedgerEntry};
use crate::ports::TrialLedgerStore;

/// Checks and records trial usage against the deletion-resistant ledger.
pub struct TrialLedgerService {
    store: Arc<dyn TrialLedgerStore>,
    email_hash_salt: SecretString,
}

impl TrialLedgerService {
    pub fn new(store: Arc<dyn TrialLedgerStore>, email_hash_salt: SecretString) -> Self {
        Self {
            store,
            email_hash_salt,
        }
    }

    fn hash(&self, email: &str) -> EmailHash {
        EmailHash::compute(email, self.email_hash_salt.expose_secret())
    }

    /// Looks up trial history for an identity.
    ///
    /// User-id match wins over email match: an account re-validating its
    /// own trial must never be flagged as abusive, whatever its email.
    pub async fn check_trial_history(
        &self,
        user_id: &UserId,
        email: Option<&str>,
    ) -> Result<TrialHistory, DomainError> {
        if self.store.get_entry(user_id).await?.is_some() {
            return Ok(TrialHistory::same_account());
        }

        if let Some(email) = email {
            if self.store.find_by_email_hash(&self.hash(email)).await?.is_some() {
                return Ok(TrialHistory::reused_email());
            }
        }

        Ok(TrialHistory::unused())
    }

    /// Records first trial usage for an identity.
    ///
    /// Called exactly once per identity, after `check_trial_history`
    /// confirmed no entry exists for this user id; the store makes the
    /// create a no-op on conflict.
    pub async fn record_trial_usage(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let entry = TrialLedgerEntry::new(user_id.clone(), email.map(|e| self.hash(e)), now);
        self.store.create_entry(&entry).await
    }
}
