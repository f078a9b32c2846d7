//! Entitlement persistence port.
//!
//! The contract to the external document store that owns user profiles.
//! The store guarantees atomic read-modify-write at single-document
//! granularity; nothing here spans documents transactionally.

use async_trait::async_trait;

use crate::domain::entitlement::{EntitlementPatch, EntitlementRecord};
use crate::domain::foundation::{DomainError, UserId};

/// Port for reading and merging entitlement records.
///
/// `merge_entitlement` must apply merge semantics: unset patch fields
/// leave stored values untouched, and the derived status fields are
/// mirrored into the user's top-level profile so UI reads a single place
/// regardless of which platform is authoritative for that user.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Reads a user's entitlement record. `None` means the user has never
    /// validated a purchase (demo).
    async fn get_entitlement(&self, user_id: &UserId)
        -> Result<Option<EntitlementRecord>, DomainError>;

    /// Merges a patch into the user's entitlement, creating the record if
    /// absent. Atomic per document.
    async fn merge_entitlement(
        &self,
        user_id: &UserId,
        patch: &EntitlementPatch,
    ) -> Result<(), DomainError>;

    /// Resolves a user by the opaque platform account token stored on the
    /// entitlement record (equality query). Used by the Apple
    /// notification endpoint.
    async fn find_user_by_platform_account_token(
        &self,
        token: &str,
    ) -> Result<Option<UserId>, DomainError>;

    /// Resolves a user by Stripe customer id. The fallback lookup for
    /// Stripe events whose metadata carries no user id.
    async fn find_user_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserId>, DomainError>;
}
