//! The persisted entitlement record and its merge-semantics patch.
//!
//! The record lives inside the user's profile document in the external
//! store. It is mutated only through `EntitlementPatch` values emitted by
//! the deriver; unset patch fields leave stored values untouched.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::{MembershipStatus, ProductClass};

/// One user's authoritative entitlement state.
///
/// Created implicitly on first successful validation; every account
/// without one is treated as [`EntitlementRecord::demo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub user_id: UserId,
    pub membership_status: MembershipStatus,
    /// Derived: true iff status is trial or premium.
    pub is_premium: bool,
    pub product_class: Option<ProductClass>,
    /// None for lifetime products and for demo accounts.
    pub expires_at: Option<Timestamp>,
    pub auto_renewing: bool,
    pub is_lifetime: bool,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub has_used_trial: bool,
    pub last_validated_at: Option<Timestamp>,
    /// Opaque id linking platform-pushed notifications back to this user
    /// without exposing the user id externally (Apple appAccountToken).
    pub platform_account_token: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

impl EntitlementRecord {
    /// The default record for an account with no validated purchase.
    pub fn demo(user_id: UserId) -> Self {
        Self {
            user_id,
            membership_status: MembershipStatus::Demo,
            is_premium: false,
            product_class: None,
            expires_at: None,
            auto_renewing: false,
            is_lifetime: false,
            trial_start: None,
            trial_end: None,
            has_used_trial: false,
            last_validated_at: None,
            platform_account_token: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
        }
    }

    /// Returns true if the record grants live premium access right now.
    pub fn has_live_access(&self, now: Timestamp) -> bool {
        if !self.membership_status.is_premium() {
            return false;
        }
        if self.is_lifetime {
            return true;
        }
        match self.expires_at {
            Some(expiry) => expiry.is_after(&now),
            None => false,
        }
    }

    /// Applies a patch in memory, returning the merged record.
    ///
    /// Mirrors the store's merge operation so pure code and tests can
    /// compute the post-merge state without a store round trip.
    pub fn merged_with(&self, patch: &EntitlementPatch) -> Self {
        let mut next = self.clone();
        if let Some(status) = patch.membership_status {
            next.membership_status = status;
        }
        if let Some(is_premium) = patch.is_premium {
            next.is_premium = is_premium;
        }
        if let Some(class) = patch.product_class {
            next.product_class = Some(class);
        }
        if let Some(expires_at) = patch.expires_at {
            next.expires_at = expires_at;
        }
        if let Some(auto_renewing) = patch.auto_renewing {
            next.auto_renewing = auto_renewing;
        }
        if let Some(is_lifetime) = patch.is_lifetime {
            next.is_lifetime = is_lifetime;
        }
        if let Some(trial_start) = patch.trial_start {
            next.trial_start = Some(trial_start);
        }
        if let Some(trial_end) = patch.trial_end {
            next.trial_end = Some(trial_end);
        }
        if let Some(has_used_trial) = patch.has_used_trial {
            next.has_used_trial = has_used_trial;
        }
        if let Some(last_validated_at) = patch.last_validated_at {
            next.last_validated_at = Some(last_validated_at);
        }
        if let Some(token) = &patch.platform_account_token {
            next.platform_account_token = Some(token.clone());
        }
        if let Some(customer_id) = &patch.stripe_customer_id {
            next.stripe_customer_id = Some(customer_id.clone());
        }
        if let Some(subscription_id) = &patch.stripe_subscription_id {
            next.stripe_subscription_id = Some(subscription_id.clone());
        }
        next
    }
}

/// Partial update to an [`EntitlementRecord`].
///
/// `None` means "leave the stored value untouched". `expires_at` is
/// doubly optional because lifetime purchases must be able to SET the
/// stored expiry to null (`Some(None)`), not merely skip it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitlementPatch {
    pub membership_status: Option<MembershipStatus>,
    pub is_premium: Option<bool>,
    pub product_class: Option<ProductClass>,
    pub expires_at: Option<Option<Timestamp>>,
    pub auto_renewing: Option<bool>,
    pub is_lifetime: Option<bool>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub has_used_trial: Option<bool>,
    pub last_validated_at: Option<Timestamp>,
    pub platform_account_token: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

impl EntitlementPatch {
    /// Returns true if the patch carries no changes.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A patch that forces the given status and recomputes `is_premium`
    /// from it. Used by webhook branches that override status directly
    /// (subscription deleted, payment failed).
    pub fn status_override(status: MembershipStatus, now: Timestamp) -> Self {
        Self {
            membership_status: Some(status),
            is_premium: Some(status.is_premium()),
            last_validated_at: Some(now),
            ..Self::default()
        }
    }
}
