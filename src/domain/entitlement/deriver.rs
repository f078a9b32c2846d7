//! Pure entitlement derivation.
//!
//! Turns a platform-verified transaction into the next persisted
//! entitlement state, applying trial-abuse policy. All cross-platform
//! business rules live here so platform quirks never leak past the
//! verifiers.

use crate::domain::foundation::Timestamp;
use crate::domain::trial::TrialHistory;

use super::{
    EntitlementError, EntitlementPatch, EntitlementRecord, MembershipStatus, ValidatedTransaction,
};

/// Outcome of a derivation: the merge patch plus whether a trial ledger
/// write must follow the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub patch: EntitlementPatch,
    /// True when this call starts the identity's first trial and the
    /// caller must create the ledger entry after persisting the patch.
    pub record_trial: bool,
}

impl Derivation {
    fn unchanged() -> Self {
        Self {
            patch: EntitlementPatch::default(),
            record_trial: false,
        }
    }
}

/// Derives the next entitlement state from a validated transaction.
///
/// Policy, in order:
///
/// 1. A persisted lifetime entitlement short-circuits: the cached record
///    is returned unchanged. Lifetime is the only state not re-validated
///    against the platform, since it cannot expire or be revoked through
///    normal lifecycle events.
/// 2. An already-expired subscription derives to `canceled` with no
///    premium access.
/// 3. Status is `trial` when the platform reports an active trial,
///    otherwise `premium`; either way `is_premium` is true.
/// 4. Trial requests consult the ledger: a trial consumed by a different
///    identity rejects the whole operation with [`EntitlementError::TrialAlreadyUsed`]
///    and nothing may be persisted. A first trial schedules a ledger
///    write via [`Derivation::record_trial`].
///
/// # Errors
///
/// - `TrialAlreadyUsed` - the fraud case; the caller must surface it,
///   never downgrade silently.
/// - `Infrastructure` - a trial transaction arrived without a ledger
///   lookup, which is a caller bug.
pub fn derive(
    validated: &ValidatedTransaction,
    trial_history: Option<&TrialHistory>,
    prior: Option<&EntitlementRecord>,
    now: Timestamp,
) -> Result<Derivation, EntitlementError> {
    // 1. Lifetime entitlements are never re-derived.
    if prior.is_some_and(|p| p.is_lifetime) {
        return Ok(Derivation::unchanged());
    }

    // 2. A lapsed subscription derives to canceled.
    if validated.is_expired(now) {
        let mut patch = EntitlementPatch::status_override(MembershipStatus::Canceled, now);
        patch.product_class = Some(validated.product_class);
        patch.expires_at = Some(validated.expires_at);
        patch.auto_renewing = Some(validated.auto_renewing);
        return Ok(Derivation {
            patch,
            record_trial: false,
        });
    }

    // 3. Base status for a live transaction.
    let status = if validated.in_trial {
        MembershipStatus::Trial
    } else {
        MembershipStatus::Premium
    };

    let mut patch = EntitlementPatch {
        membership_status: Some(status),
        is_premium: Some(true),
        product_class: Some(validated.product_class),
        expires_at: Some(validated.expires_at),
        auto_renewing: Some(validated.auto_renewing),
        is_lifetime: Some(validated.is_lifetime),
        last_validated_at: Some(now),
        ..EntitlementPatch::default()
    };

    // 4. Trial policy.
    let mut record_trial = false;
    if validated.in_trial {
        let history = trial_history.ok_or_else(|| {
            EntitlementError::infrastructure("trial transaction derived without a ledger lookup")
        })?;

        if history.is_fraud() {
            return Err(EntitlementError::trial_already_used());
        }

        patch.has_used_trial = Some(true);
        if let Some(window) = validated.trial_window {
            patch.trial_start = Some(window.start);
            patch.trial_end = Some(window.end);
        }
        record_trial = !history.used;
    }

    Ok(Derivation {
        patch,
        record_trial,
    })
}
