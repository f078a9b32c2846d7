//! HTTP handlers for billing endpoints.
//!
//! These handlers connect axum routes to the application layer command
//! handlers. The two webhook endpoints have opposite failure postures:
//! Apple always gets 200 (its retry storm never resolves a broken
//! payload), Stripe gets 400 on signature failure and 500 on processing
//! failure (its retry-with-backoff is wanted there).

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::{
    EntitlementView, ProcessAppleNotificationHandler, ProcessStripeEventHandler,
    ValidatePurchaseCommand, ValidatePurchaseHandler,
};
use crate::application::TrialLedgerService;
use crate::domain::entitlement::{EntitlementError, EntitlementRecord, FailureCategory, Platform};
use crate::domain::foundation::UserId;
use crate::ports::{AppleNotificationVerifier, EntitlementStore, PurchaseVerifier};

use super::dto::{AppleNotificationRequest, ErrorResponse, StripeAckResponse, ValidatePurchaseRequest};
use crate::adapters::stripe::{StripeWebhookVerifier, WebhookError};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; all dependencies are Arc-wrapped immutable
/// configuration and clients. There is no mutable global state.
#[derive(Clone)]
pub struct BillingAppState {
    pub entitlement_store: Arc<dyn EntitlementStore>,
    pub trial_ledger: Arc<TrialLedgerService>,
    pub apple_verifier: Arc<dyn PurchaseVerifier>,
    pub google_verifier: Arc<dyn PurchaseVerifier>,
    pub apple_notification_verifier: Arc<dyn AppleNotificationVerifier>,
    pub stripe_webhook_verifier: Arc<StripeWebhookVerifier>,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn validate_purchase_handler(&self) -> ValidatePurchaseHandler {
        ValidatePurchaseHandler::new(
            self.entitlement_store.clone(),
            self.trial_ledger.clone(),
            self.apple_verifier.clone(),
            self.google_verifier.clone(),
        )
    }

    pub fn apple_notification_handler(&self) -> ProcessAppleNotificationHandler {
        ProcessAppleNotificationHandler::new(
            self.apple_notification_verifier.clone(),
            self.entitlement_store.clone(),
        )
    }

    pub fn stripe_event_handler(&self) -> ProcessStripeEventHandler {
        ProcessStripeEventHandler::new(self.entitlement_store.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (would come from auth middleware in production)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// In production this is populated from the verified identity token by
/// the API gateway; for development and testing it reads the
/// `X-User-Id` / `X-User-Email` headers the gateway would set.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: Option<String>,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new(
            "AUTHENTICATION_REQUIRED",
            FailureCategory::Unauthenticated.as_str(),
            "Authentication is required",
        );
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| UserId::new(s).ok())
                .ok_or(AuthenticationRequired)?;

            let email = parts
                .headers
                .get("X-User-Email")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            Ok(AuthenticatedUser { user_id, email })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Client Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/validate - Validate a purchase and persist the result
pub async fn validate_purchase(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<ValidatePurchaseRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let platform = Platform::parse(&request.platform).ok_or_else(|| {
        BillingApiError(EntitlementError::invalid_argument(
            "platform",
            format!("unknown platform '{}'", request.platform),
        ))
    })?;

    let handler = state.validate_purchase_handler();
    let cmd = ValidatePurchaseCommand {
        user_id: user.user_id,
        email: user.email,
        platform,
        product_id: request.product_id,
        receipt: request.receipt,
        purchase_token: request.purchase_token,
        platform_account_token: request.platform_account_token,
    };

    let view = handler.handle(cmd).await?;

    Ok(Json(view))
}

/// GET /api/billing/entitlement - Read the persisted entitlement
pub async fn get_entitlement(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let record = state
        .entitlement_store
        .get_entitlement(&user.user_id)
        .await
        .map_err(|e| BillingApiError(EntitlementError::infrastructure(e.to_string())))?
        .unwrap_or_else(|| EntitlementRecord::demo(user.user_id.clone()));

    Ok(Json(EntitlementView::from(&record)))
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    "ok"
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/apple - Handle App Store server notifications
///
/// Always responds 200 with a short plain-text acknowledgment. Apple
/// retries on non-2xx; a payload this service can never resolve (broken
/// signature, unlinkable token) would otherwise be redelivered forever.
pub async fn apple_notifications(
    State(state): State<BillingAppState>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let request: AppleNotificationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable apple notification body");
            return (StatusCode::OK, "OK");
        }
    };

    let handler = state.apple_notification_handler();
    let outcome = handler.handle(&request.signed_payload).await;
    tracing::debug!(?outcome, "apple notification processed");

    (StatusCode::OK, "OK")
}

/// POST /api/webhooks/stripe - Handle Stripe webhook events
///
/// 400 only on signature failure, 500 on internal processing error;
/// Stripe retries non-2xx with backoff, which is the desired behavior
/// for both.
pub async fn stripe_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, StripeWebhookApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            StripeWebhookApiError(WebhookError::ParseError(
                "missing Stripe-Signature header".to_string(),
            ))
        })?;

    let event = state
        .stripe_webhook_verifier
        .verify_and_parse(&body, signature)
        .map_err(StripeWebhookApiError)?;

    let handler = state.stripe_event_handler();
    handler
        .handle(&event)
        .await
        .map_err(|e| StripeWebhookApiError(WebhookError::Processing(e.message())))?;

    Ok(Json(StripeAckResponse { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts entitlement errors to HTTP responses.
pub struct BillingApiError(pub EntitlementError);

impl From<EntitlementError> for BillingApiError {
    fn from(err: EntitlementError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let category = self.0.category();
        let status = match category {
            FailureCategory::Unauthenticated => StatusCode::UNAUTHORIZED,
            FailureCategory::InvalidArgument => StatusCode::BAD_REQUEST,
            FailureCategory::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            FailureCategory::NotFound => StatusCode::NOT_FOUND,
            FailureCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse::new(
            self.0.code().to_string(),
            category.as_str(),
            self.0.message(),
        );
        (status, Json(body)).into_response()
    }
}

/// Error type for the Stripe webhook endpoint.
pub struct StripeWebhookApiError(pub WebhookError);

impl IntoResponse for StripeWebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        let body = ErrorResponse::new(
            "WEBHOOK_ERROR",
            if status.is_server_error() {
                FailureCategory::Internal.as_str()
            } else {
                FailureCategory::InvalidArgument.as_str()
            },
            self.0.to_string(),
        );
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::{EntitlementPatch, ProductClass, ValidatedTransaction};
    use crate::domain::foundation::{DomainError, Timestamp};
    use crate::domain::trial::{EmailHash, TrialLedgerEntry};
    use crate::ports::{
        AppleNotification, NotificationError, TrialLedgerStore, VerificationError, VerifyRequest,
    };
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    struct MockEntitlementStore {
        records: Mutex<Vec<EntitlementRecord>>,
    }

    impl MockEntitlementStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EntitlementStore for MockEntitlementStore {
        async fn get_entitlement(
            &self,
            user_id: &UserId,
        ) -> Result<Option<EntitlementRecord>, DomainError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| &r.user_id == user_id)
                .cloned())
        }

        async fn merge_entitlement(
            &self,
            user_id: &UserId,
            patch: &EntitlementPatch,
        ) -> Result<(), DomainError> {
            let mut records = self.records.lock().unwrap();
            match records.iter_mut().find(|r| &r.user_id == user_id) {
                Some(record) => *record = record.merged_with(patch),
                None => {
                    records.push(EntitlementRecord::demo(user_id.clone()).merged_with(patch))
                }
            }
            Ok(())
        }

        async fn find_user_by_platform_account_token(
            &self,
            _token: &str,
        ) -> Result<Option<UserId>, DomainError> {
            Ok(None)
        }

        async fn find_user_by_stripe_customer_id(
            &self,
            _customer_id: &str,
        ) -> Result<Option<UserId>, DomainError> {
            Ok(None)
        }
    }

    struct MockLedgerStore {
        entries: Mutex<Vec<TrialLedgerEntry>>,
    }

    #[async_trait]
    impl TrialLedgerStore for MockLedgerStore {
        async fn get_entry(
            &self,
            user_id: &UserId,
        ) -> Result<Option<TrialLedgerEntry>, DomainError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .find(|e| &e.user_id == user_id)
                .cloned())
        }

        async fn find_by_email_hash(
            &self,
            hash: &EmailHash,
        ) -> Result<Option<TrialLedgerEntry>, DomainError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.email_hash.as_ref() == Some(hash))
                .cloned())
        }

        async fn create_entry(&self, entry: &TrialLedgerEntry) -> Result<(), DomainError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    struct MockVerifier {
        tx: ValidatedTransaction,
    }

    #[async_trait]
    impl PurchaseVerifier for MockVerifier {
        fn platform(&self) -> Platform {
            self.tx.platform
        }

        async fn verify(
            &self,
            _request: &VerifyRequest,
        ) -> Result<ValidatedTransaction, VerificationError> {
            Ok(self.tx.clone())
        }
    }

    struct MockNotificationVerifier;

    impl AppleNotificationVerifier for MockNotificationVerifier {
        fn verify(&self, _signed_payload: &str) -> Result<AppleNotification, NotificationError> {
            Err(NotificationError::MalformedPayload("test".to_string()))
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn paid_tx(platform: Platform) -> ValidatedTransaction {
        ValidatedTransaction {
            platform,
            product_id: "premium_monthly".to_string(),
            product_class: ProductClass::Monthly,
            is_lifetime: false,
            expires_at: Some(Timestamp::now().add_days(30)),
            in_trial: false,
            trial_window: None,
            auto_renewing: true,
            raw_status: "0".to_string(),
        }
    }

    fn test_state() -> BillingAppState {
        BillingAppState {
            entitlement_store: Arc::new(MockEntitlementStore::new()),
            trial_ledger: Arc::new(TrialLedgerService::new(
                Arc::new(MockLedgerStore {
                    entries: Mutex::new(Vec::new()),
                }),
                SecretString::new("http-test-salt-0123".to_string()),
            )),
            apple_verifier: Arc::new(MockVerifier {
                tx: paid_tx(Platform::Ios),
            }),
            google_verifier: Arc::new(MockVerifier {
                tx: paid_tx(Platform::Android),
            }),
            apple_notification_verifier: Arc::new(MockNotificationVerifier),
            stripe_webhook_verifier: Arc::new(StripeWebhookVerifier::new(SecretString::new(
                "whsec_http_test".to_string(),
            ))),
        }
    }

    fn test_user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: UserId::new("user-1").unwrap(),
            email: Some("person@example.com".to_string()),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Handler Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn validate_purchase_returns_ok_for_valid_request() {
        let state = test_state();
        let request = ValidatePurchaseRequest {
            platform: "ios".to_string(),
            product_id: "premium_monthly".to_string(),
            receipt: Some("base64==".to_string()),
            purchase_token: None,
            platform_account_token: None,
        };

        let result = validate_purchase(State(state), test_user(), Json(request)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn validate_purchase_rejects_unknown_platform() {
        let state = test_state();
        let request = ValidatePurchaseRequest {
            platform: "windows-phone".to_string(),
            product_id: "premium_monthly".to_string(),
            receipt: None,
            purchase_token: None,
            platform_account_token: None,
        };

        let result = validate_purchase(State(state), test_user(), Json(request)).await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_entitlement_defaults_to_demo() {
        let state = test_state();
        let result = get_entitlement(State(state), test_user()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn apple_endpoint_returns_200_for_garbage_body() {
        let state = test_state();
        let response = apple_notifications(State(state), axum::body::Bytes::from_static(b"{{{"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn apple_endpoint_returns_200_when_verification_fails() {
        // MockNotificationVerifier always fails verification.
        let state = test_state();
        let body = axum::body::Bytes::from_static(br#"{"signedPayload": "junk"}"#);
        let response = apple_notifications(State(state), body).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stripe_endpoint_rejects_missing_signature_with_400() {
        let state = test_state();
        let headers = axum::http::HeaderMap::new();
        let body = axum::body::Bytes::from_static(b"{}");

        let result = stripe_webhook(State(state), headers, body).await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stripe_endpoint_rejects_tampered_body_with_400() {
        let state = test_state();
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "Stripe-Signature",
            format!("t={},v1={}", chrono::Utc::now().timestamp(), "ab".repeat(32))
                .parse()
                .unwrap(),
        );
        let body = axum::body::Bytes::from_static(b"{\"id\":\"evt_tampered\"}");

        let result = stripe_webhook(State(state), headers, body).await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Mapping Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn api_error_maps_unauthenticated_to_401() {
        let response = BillingApiError(EntitlementError::unauthenticated()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn api_error_maps_invalid_argument_to_400() {
        let response =
            BillingApiError(EntitlementError::invalid_argument("platform", "bad")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_maps_fraud_to_412() {
        let response = BillingApiError(EntitlementError::trial_already_used()).into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn api_error_maps_verification_failure_to_412() {
        let response =
            BillingApiError(EntitlementError::verification_failed(Platform::Ios, "bad receipt"))
                .into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn api_error_maps_not_found_to_404() {
        let response = BillingApiError(EntitlementError::user_not_found("token")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn api_error_maps_infrastructure_to_500() {
        let response =
            BillingApiError(EntitlementError::infrastructure("db down")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn stripe_error_maps_signature_to_400_and_processing_to_500() {
        let response = StripeWebhookApiError(WebhookError::InvalidSignature).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            StripeWebhookApiError(WebhookError::Processing("merge failed".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
