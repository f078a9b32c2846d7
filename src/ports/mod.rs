//! Ports: async trait contracts between the application core and the
//! outside world (document store, platform verification APIs).

mod apple_notifications;
mod entitlement_store;
mod purchase_verifier;
mod trial_ledger_store;

pub use apple_notifications::{
    AppleNotification, AppleNotificationVerifier, AppleTransactionInfo, NotificationError,
};
pub use entitlement_store::EntitlementStore;
pub use purchase_verifier::{PurchaseVerifier, VerificationError, VerifyRequest};
pub use trial_ledger_store::TrialLedgerStore;
