//! Stripe webhook adapter.
//!
//! Signature verification and the event envelope. Stripe never flows
//! through client-invoked validation; it reaches this service only as
//! signed webhook events.

mod event;
mod webhook_verifier;

pub use event::{StripeEvent, StripeEventType};
pub use webhook_verifier::{SignatureHeader, StripeWebhookVerifier, WebhookError};

#[cfg(test)]
pub(crate) use event::StripeEventBuilder;
