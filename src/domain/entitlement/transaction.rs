//! Normalized output of a platform verifier.
//!
//! Every verifier, whatever its wire format, reduces a purchase to this
//! shape so the deriver never sees platform quirks. The value is
//! ephemeral: it exists only for the duration of one reconciliation call.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::{Platform, ProductClass};

/// The trial period reported by the platform for an in-trial purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A platform-verified purchase, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedTransaction {
    pub platform: Platform,
    pub product_id: String,
    pub product_class: ProductClass,
    pub is_lifetime: bool,
    /// None for lifetime products.
    pub expires_at: Option<Timestamp>,
    pub in_trial: bool,
    pub trial_window: Option<TrialWindow>,
    pub auto_renewing: bool,
    /// The platform's own status value, kept verbatim for logging.
    pub raw_status: String,
}

impl ValidatedTransaction {
    /// Returns true if the transaction no longer grants access.
    ///
    /// Lifetime purchases never expire; a subscription with no expiry
    /// is treated as expired rather than granted open-ended access.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        if self.is_lifetime {
            return false;
        }
        match self.expires_at {
            Some(expiry) => !expiry.is_after(&now),
            None => true,
        }
    }
}
