//! Trial ledger persistence port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::trial::{EmailHash, TrialLedgerEntry};

/// Port for the write-once trial ledger.
///
/// Implementations must exclude this data from any account-deletion
/// cascade: entries outlive the accounts that created them.
#[async_trait]
pub trait TrialLedgerStore: Send + Sync {
    /// Looks up the entry for a user id (exact match).
    async fn get_entry(&self, user_id: &UserId)
        -> Result<Option<TrialLedgerEntry>, DomainError>;

    /// Looks up an entry by salted email hash (equality query).
    async fn find_by_email_hash(
        &self,
        hash: &EmailHash,
    ) -> Result<Option<TrialLedgerEntry>, DomainError>;

    /// Creates a new entry. Must be a no-op if an entry already exists
    /// for the user id, so concurrent first-trial requests cannot
    /// double-write.
    async fn create_entry(&self, entry: &TrialLedgerEntry) -> Result<(), DomainError>;
}
