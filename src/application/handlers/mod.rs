//! Command handlers for the three reconciliation entry points.

mod apple_notification;
mod stripe_event;
mod validate_purchase;

pub use apple_notification::{NotificationOutcome, ProcessAppleNotificationHandler};
pub use stripe_event::{ProcessStripeEventHandler, StripeOutcome};
pub use validate_purchase::{EntitlementView, ValidatePurchaseCommand, ValidatePurchaseHandler};
