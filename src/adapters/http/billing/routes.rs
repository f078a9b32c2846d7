//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    apple_notifications, get_entitlement, health, stripe_webhook, validate_purchase,
    BillingAppState,
};

/// Create the client-facing billing router.
///
/// # Routes
/// - `POST /validate` - Validate a purchase (authenticated)
/// - `GET /entitlement` - Read the persisted entitlement (authenticated)
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/validate", post(validate_purchase))
        .route("/entitlement", get(get_entitlement))
}

/// Create the webhook router.
///
/// Separate from the client routes because platform-pushed requests
/// carry no user authentication; trust comes from signature/JWS
/// verification inside the handlers.
///
/// # Routes
/// - `POST /apple` - App Store server notifications (always 200)
/// - `POST /stripe` - Stripe events (400 on signature failure)
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/apple", post(apple_notifications))
        .route("/stripe", post(stripe_webhook))
}

/// Create the complete billing module router.
///
/// Mounts client routes under `/api/billing`, webhooks under
/// `/api/webhooks`, and the health probe at `/health`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/billing", billing_routes())
        .nest("/api/webhooks", webhook_routes())
        .route("/health", get(health))
}
