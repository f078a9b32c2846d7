//! Stripe webhook event types.
//!
//! Only fields relevant to entitlement reconciliation are captured;
//! the rest of Stripe's event schema is ignored.

use serde::{Deserialize, Serialize};

/// Stripe webhook event (simplified).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: StripeEventData,

    /// Whether this is a live mode event (vs test mode).
    pub livemode: bool,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Returns true if this is a live mode event.
    pub fn is_live(&self) -> bool {
        self.livemode
    }

    /// Attempts to deserialize the data object as the specified type.
    pub fn deserialize_object<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }

    /// Parse the event type into a known enum variant.
    pub fn parsed_type(&self) -> StripeEventType {
        StripeEventType::from_type_str(&self.event_type)
    }
}

/// The Stripe event types this service reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripeEventType {
    /// Checkout completed: attach customer/subscription ids, set initial status.
    CheckoutSessionCompleted,
    /// Subscription changed: recompute status from Stripe's status enum.
    CustomerSubscriptionUpdated,
    /// Subscription ended: force canceled.
    CustomerSubscriptionDeleted,
    /// Payment failed: force past_due.
    InvoicePaymentFailed,
    /// Anything else: acknowledged and ignored.
    Unknown,
}

impl StripeEventType {
    /// Parse event type from the wire string.
    pub fn from_type_str(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            _ => Self::Unknown,
        }
    }

    /// Convert to the Stripe event type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Unknown => "unknown",
        }
    }
}

/// Builder for creating test StripeEvent instances.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl Default for StripeEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "checkout.session.completed".to_string(),
            created: 1_704_067_200,
            object: serde_json::json!({}),
            livemode: false,
        }
    }
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn livemode(mut self, livemode: bool) -> Self {
        self.livemode = livemode;
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: StripeEventData { object: self.object },
            livemode: self.livemode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_minimal_event() {
        let json = r#"{
            "id": "evt_1234567890",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "data": {
                "object": {}
            },
            "livemode": false
        }"#;

        let event: StripeEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.id, "evt_1234567890");
        assert_eq!(event.parsed_type(), StripeEventType::CheckoutSessionCompleted);
        assert!(!event.is_live());
    }

    #[test]
    fn unknown_event_type_parses_to_unknown() {
        let event = StripeEventBuilder::new()
            .event_type("charge.refunded")
            .build();
        assert_eq!(event.parsed_type(), StripeEventType::Unknown);
    }

    #[test]
    fn event_type_strings_roundtrip() {
        for event_type in [
            StripeEventType::CheckoutSessionCompleted,
            StripeEventType::CustomerSubscriptionUpdated,
            StripeEventType::CustomerSubscriptionDeleted,
            StripeEventType::InvoicePaymentFailed,
        ] {
            assert_eq!(StripeEventType::from_type_str(event_type.as_str()), event_type);
        }
    }

    #[test]
    fn deserialize_object_to_custom_type() {
        #[derive(Debug, Deserialize)]
        struct Session {
            id: String,
            customer: String,
        }

        let event = StripeEventBuilder::new()
            .object(json!({
                "id": "cs_test_abc123",
                "customer": "cus_xyz789"
            }))
            .build();

        let session: Session = event.deserialize_object().unwrap();
        assert_eq!(session.id, "cs_test_abc123");
        assert_eq!(session.customer, "cus_xyz789");
    }

    #[test]
    fn deserialize_object_fails_for_wrong_type() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Invoice {
            amount_due: i64,
        }

        let event = StripeEventBuilder::new()
            .object(json!({"id": "cs_test"}))
            .build();

        let result: Result<Invoice, _> = event.deserialize_object();
        assert!(result.is_err());
    }
}
