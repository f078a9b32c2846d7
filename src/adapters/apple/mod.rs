//! Apple App Store adapters.
//!
//! Two independent verification paths: the legacy verifyReceipt endpoint
//! for client-submitted receipts, and JWS signed payloads for
//! server-to-server notifications.

mod notification;
mod receipt;

pub use notification::JwsNotificationVerifier;
pub use receipt::AppleReceiptVerifier;
