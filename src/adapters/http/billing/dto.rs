//! Request/response DTOs for the billing endpoints.
//!
//! Client-facing field names are camelCase to match the mobile apps'
//! JSON conventions. The entitlement response itself is
//! [`crate::application::handlers::EntitlementView`].

use serde::{Deserialize, Serialize};

/// POST /api/billing/validate request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePurchaseRequest {
    /// "ios" or "android".
    pub platform: String,
    pub product_id: String,
    /// Base64 receipt blob (ios).
    pub receipt: Option<String>,
    /// Play purchase token (android).
    pub purchase_token: Option<String>,
    /// Opaque token registered with the store platform at purchase time.
    pub platform_account_token: Option<String>,
}

/// POST /api/webhooks/apple request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleNotificationRequest {
    pub signed_payload: String,
}

/// Stripe webhook acknowledgment body.
#[derive(Debug, Clone, Serialize)]
pub struct StripeAckResponse {
    pub received: bool,
}

/// Structured error body for client-facing failures.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable category: unauthenticated, invalid-argument,
    /// failed-precondition, not-found, internal.
    pub category: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(
        error: impl Into<String>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            category: category.into(),
            message: message.into(),
        }
    }
}
