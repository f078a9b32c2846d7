//! Trial ledger entry and lookup result.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::EmailHash;

/// One identity's permanent record of having started a free trial.
///
/// Created exactly once, at first successful trial start. Never deleted,
/// including when the owning account is deleted; it is deliberately
/// excluded from the account-deletion cascade so a delete-and-recreate
/// cycle cannot mint a second trial for the same email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialLedgerEntry {
    pub user_id: UserId,
    /// Absent when the identity provider supplied no email.
    pub email_hash: Option<EmailHash>,
    pub first_trial_date: Timestamp,
}

impl TrialLedgerEntry {
    pub fn new(user_id: UserId, email_hash: Option<EmailHash>, first_trial_date: Timestamp) -> Self {
        Self {
            user_id,
            email_hash,
            first_trial_date,
        }
    }
}

/// Result of a trial-history lookup for one (user id, email) identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialHistory {
    /// A ledger entry exists for this identity.
    pub used: bool,
    /// The entry belongs to this very user id: a re-validation of an
    /// existing trial, not abuse.
    pub same_account: bool,
}

impl TrialHistory {
    /// No prior trial anywhere for this identity.
    pub fn unused() -> Self {
        Self {
            used: false,
            same_account: false,
        }
    }

    /// This user id already holds the entry (re-validation).
    pub fn same_account() -> Self {
        Self {
            used: true,
            same_account: true,
        }
    }

    /// A different identity already consumed a trial with this email.
    pub fn reused_email() -> Self {
        Self {
            used: true,
            same_account: false,
        }
    }

    /// The abuse case: a trial was consumed, but not by this account.
    pub fn is_fraud(&self) -> bool {
        self.used && !self.same_account
    }
}
