//! Apple server-notification verification port.
//!
//! Verifies App Store Server Notification V2 signed payloads and
//! normalizes the decoded result. Kept behind a trait so the endpoint
//! handler can be exercised without certificate material.

use thiserror::Error;

use crate::domain::foundation::Timestamp;

/// A verified, decoded App Store server notification.
#[derive(Debug, Clone, PartialEq)]
pub struct AppleNotification {
    /// e.g. "SUBSCRIBED", "DID_RENEW", "EXPIRED".
    pub notification_type: String,
    /// e.g. "INITIAL_BUY", "VOLUNTARY".
    pub subtype: Option<String>,
    pub notification_uuid: String,
    pub bundle_id: String,
    pub environment: String,
    /// Decoded nested transaction, when the notification carries one.
    pub transaction: Option<AppleTransactionInfo>,
}

/// The nested signed transaction payload, decoded and verified.
#[derive(Debug, Clone, PartialEq)]
pub struct AppleTransactionInfo {
    pub product_id: String,
    pub original_transaction_id: String,
    pub expires_date: Option<Timestamp>,
    /// The opaque token the client set at purchase time; links the
    /// notification back to a user without exposing the user id.
    pub app_account_token: Option<String>,
    pub in_trial: bool,
    /// From the signed renewal info, when present.
    pub auto_renewing: Option<bool>,
}

/// Errors from signed-notification verification.
///
/// All of these are non-fatal to the notification endpoint: an
/// unverifiable notification is logged and acknowledged, never retried
/// forever.
#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Malformed signed payload: {0}")]
    MalformedPayload(String),

    #[error("Certificate chain not anchored to a pinned root: {0}")]
    UntrustedChain(String),

    #[error("JWS signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Bundle id mismatch: expected {expected}, got {actual}")]
    BundleMismatch { expected: String, actual: String },

    #[error("Environment mismatch: expected {expected}, got {actual}")]
    EnvironmentMismatch { expected: String, actual: String },
}

/// Port for Apple signed-notification verification.
pub trait AppleNotificationVerifier: Send + Sync {
    /// Verifies the outer signed payload and its nested transaction
    /// payload, both against the pinned Apple roots.
    fn verify(&self, signed_payload: &str) -> Result<AppleNotification, NotificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_notification_verifier_is_object_safe() {
        fn _accepts_dyn(_verifier: &dyn AppleNotificationVerifier) {}
    }
}
