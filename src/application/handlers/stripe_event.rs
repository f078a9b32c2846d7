//! ProcessStripeEventHandler - Stripe webhook event reconciliation.
//!
//! Each branch recomputes and overwrites the target user's entitlement
//! from the event's own data, so at-least-once redelivery is harmless.
//! The store's merge mirrors the derived status into the user's
//! top-level profile fields, keeping a single read location for the UI
//! regardless of which platform is authoritative.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::adapters::stripe::{StripeEvent, StripeEventType};
use crate::domain::entitlement::{EntitlementError, EntitlementPatch, MembershipStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::EntitlementStore;

/// Metadata key carrying our user id on Stripe objects.
const USER_ID_METADATA_KEY: &str = "user_id";

/// Result of processing one Stripe event.
#[derive(Debug, Clone, PartialEq)]
pub enum StripeOutcome {
    /// The target user's entitlement was updated.
    Applied {
        user_id: UserId,
        status: MembershipStatus,
    },
    /// Event type is not reconciled here; acknowledged as received.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    customer: Option<String>,
    subscription: Option<String>,
    status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: Option<String>,
    customer: Option<String>,
    status: Option<String>,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    customer: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Handler for verified Stripe webhook events.
pub struct ProcessStripeEventHandler {
    store: Arc<dyn EntitlementStore>,
}

impl ProcessStripeEventHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Dispatches one verified event by type.
    ///
    /// # Errors
    ///
    /// `Infrastructure` errors bubble up to a 500 so Stripe retries with
    /// backoff; user resolution failures are treated the same way since
    /// a not-yet-written profile may resolve on a later attempt.
    pub async fn handle(&self, event: &StripeEvent) -> Result<StripeOutcome, EntitlementError> {
        match event.parsed_type() {
            StripeEventType::CheckoutSessionCompleted => self.handle_checkout_completed(event).await,
            StripeEventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_updated(event).await
            }
            StripeEventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event).await
            }
            StripeEventType::InvoicePaymentFailed => self.handle_payment_failed(event).await,
            StripeEventType::Unknown => {
                tracing::debug!(event_type = %event.event_type, "ignoring stripe event");
                Ok(StripeOutcome::Ignored)
            }
        }
    }

    /// Resolves the target user: explicit metadata first, then the
    /// reverse lookup by customer id.
    async fn resolve_user(
        &self,
        metadata: &HashMap<String, String>,
        customer_id: Option<&str>,
    ) -> Result<UserId, EntitlementError> {
        if let Some(raw) = metadata.get(USER_ID_METADATA_KEY) {
            return UserId::new(raw.clone())
                .map_err(|e| EntitlementError::infrastructure(format!("bad metadata user id: {}", e)));
        }

        let customer_id = customer_id.ok_or_else(|| {
            EntitlementError::infrastructure("event has neither user metadata nor customer id")
        })?;

        self.store
            .find_user_by_stripe_customer_id(customer_id)
            .await?
            .ok_or_else(|| {
                EntitlementError::infrastructure(format!(
                    "no user for stripe customer {}",
                    customer_id
                ))
            })
    }

    async fn handle_checkout_completed(
        &self,
        event: &StripeEvent,
    ) -> Result<StripeOutcome, EntitlementError> {
        let session: CheckoutSessionObject = event
            .deserialize_object()
            .map_err(|e| EntitlementError::infrastructure(format!("checkout payload: {}", e)))?;

        let user_id = self
            .resolve_user(&session.metadata, session.customer.as_deref())
            .await?;

        let status = session
            .status
            .as_deref()
            .map(map_session_status)
            .unwrap_or(MembershipStatus::Premium);

        let mut patch = EntitlementPatch::status_override(status, Timestamp::now());
        patch.stripe_customer_id = session.customer.clone();
        patch.stripe_subscription_id = session.subscription.clone();

        self.store.merge_entitlement(&user_id, &patch).await?;

        tracing::info!(user_id = %user_id, %status, "stripe checkout completed");
        Ok(StripeOutcome::Applied { user_id, status })
    }

    async fn handle_subscription_updated(
        &self,
        event: &StripeEvent,
    ) -> Result<StripeOutcome, EntitlementError> {
        let subscription: SubscriptionObject = event
            .deserialize_object()
            .map_err(|e| EntitlementError::infrastructure(format!("subscription payload: {}", e)))?;

        let user_id = self
            .resolve_user(&subscription.metadata, subscription.customer.as_deref())
            .await?;

        let status = subscription
            .status
            .as_deref()
            .map(map_subscription_status)
            .unwrap_or(MembershipStatus::Canceled);

        let mut patch = EntitlementPatch::status_override(status, Timestamp::now());
        patch.expires_at = subscription
            .current_period_end
            .map(|secs| Some(Timestamp::from_unix_secs(secs)));
        patch.auto_renewing = Some(!subscription.cancel_at_period_end);
        patch.stripe_customer_id = subscription.customer.clone();
        patch.stripe_subscription_id = subscription.id.clone();

        self.store.merge_entitlement(&user_id, &patch).await?;

        tracing::info!(user_id = %user_id, %status, "stripe subscription updated");
        Ok(StripeOutcome::Applied { user_id, status })
    }

    async fn handle_subscription_deleted(
        &self,
        event: &StripeEvent,
    ) -> Result<StripeOutcome, EntitlementError> {
        let subscription: SubscriptionObject = event
            .deserialize_object()
            .map_err(|e| EntitlementError::infrastructure(format!("subscription payload: {}", e)))?;

        let user_id = self
            .resolve_user(&subscription.metadata, subscription.customer.as_deref())
            .await?;

        let status = MembershipStatus::Canceled;
        let mut patch = EntitlementPatch::status_override(status, Timestamp::now());
        patch.auto_renewing = Some(false);

        self.store.merge_entitlement(&user_id, &patch).await?;

        tracing::info!(user_id = %user_id, "stripe subscription deleted");
        Ok(StripeOutcome::Applied { user_id, status })
    }

    async fn handle_payment_failed(
        &self,
        event: &StripeEvent,
    ) -> Result<StripeOutcome, EntitlementError> {
        let invoice: InvoiceObject = event
            .deserialize_object()
            .map_err(|e| EntitlementError::infrastructure(format!("invoice payload: {}", e)))?;

        let user_id = self
            .resolve_user(&invoice.metadata, invoice.customer.as_deref())
            .await?;

        let status = MembershipStatus::PastDue;
        let patch = EntitlementPatch::status_override(status, Timestamp::now());

        self.store.merge_entitlement(&user_id, &patch).await?;

        tracing::info!(user_id = %user_id, "stripe invoice payment failed");
        Ok(StripeOutcome::Applied { user_id, status })
    }
}

/// Maps a Stripe subscription status to ours.
fn map_subscription_status(status: &str) -> MembershipStatus {
    match status {
        "active" => MembershipStatus::Premium,
        "trialing" => MembershipStatus::Trial,
        "past_due" => MembershipStatus::PastDue,
        "incomplete" => MembershipStatus::Demo,
        // canceled, unpaid, incomplete_expired, paused
        _ => MembershipStatus::Canceled,
    }
}

/// Maps a checkout session status to an initial membership status.
fn map_session_status(status: &str) -> MembershipStatus {
    match status {
        "complete" => MembershipStatus::Premium,
        "expired" => MembershipStatus::Canceled,
        // "open": payment not finished yet
        _ => MembershipStatus::Demo,
    }
}
