//! Apple verifyReceipt client.
//!
//! Verifies base64 receipt blobs against the App Store. Receipts from
//! TestFlight and review builds hit the production endpoint first and
//! come back with status 21007 ("sandbox receipt used in production");
//! those are retried against the sandbox endpoint exactly once.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AppleConfig;
use crate::domain::entitlement::{Platform, ProductClass, TrialWindow, ValidatedTransaction};
use crate::domain::foundation::Timestamp;
use crate::ports::{PurchaseVerifier, VerificationError, VerifyRequest};

/// Status code Apple returns for a sandbox receipt sent to production.
const SANDBOX_RECEIPT_STATUS: i64 = 21007;

/// Verifier for client-submitted App Store receipts.
pub struct AppleReceiptVerifier {
    shared_secret: SecretString,
    production_url: String,
    sandbox_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct VerifyReceiptRequest<'a> {
    #[serde(rename = "receipt-data")]
    receipt_data: &'a str,
    password: &'a str,
    #[serde(rename = "exclude-old-transactions")]
    exclude_old_transactions: bool,
}

#[derive(Debug, Deserialize)]
struct VerifyReceiptResponse {
    status: i64,
    receipt: Option<ReceiptInfo>,
    latest_receipt_info: Option<Vec<InAppTransaction>>,
    pending_renewal_info: Option<Vec<PendingRenewal>>,
}

#[derive(Debug, Deserialize)]
struct ReceiptInfo {
    #[serde(default)]
    in_app: Vec<InAppTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
struct InAppTransaction {
    product_id: String,
    expires_date_ms: Option<String>,
    purchase_date_ms: Option<String>,
    /// Apple sends booleans as the strings "true"/"false" here.
    is_trial_period: Option<String>,
    is_in_intro_offer_period: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PendingRenewal {
    product_id: Option<String>,
    auto_renew_product_id: Option<String>,
    /// "1" = will renew, "0" = renewal turned off.
    auto_renew_status: Option<String>,
}

impl InAppTransaction {
    fn expires_ms(&self) -> Option<i64> {
        self.expires_date_ms.as_deref().and_then(|s| s.parse().ok())
    }

    fn purchase_ms(&self) -> Option<i64> {
        self.purchase_date_ms.as_deref().and_then(|s| s.parse().ok())
    }

    fn in_trial(&self) -> bool {
        let flag = |s: &Option<String>| s.as_deref() == Some("true");
        flag(&self.is_trial_period) || flag(&self.is_in_intro_offer_period)
    }
}

impl AppleReceiptVerifier {
    /// Creates a verifier from Apple configuration.
    pub fn new(config: &AppleConfig) -> Self {
        Self {
            shared_secret: config.shared_secret.clone(),
            production_url: config.production_url.clone(),
            sandbox_url: config.sandbox_url.clone(),
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn call_verify(
        &self,
        url: &str,
        receipt: &str,
    ) -> Result<VerifyReceiptResponse, VerificationError> {
        let body = VerifyReceiptRequest {
            receipt_data: receipt,
            password: self.shared_secret.expose_secret(),
            exclude_old_transactions: true,
        };

        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VerificationError::Http(e.to_string()))?;

        response
            .json::<VerifyReceiptResponse>()
            .await
            .map_err(|e| VerificationError::InvalidResponse(e.to_string()))
    }

    /// Calls production first, then sandbox on the 21007 redirect.
    async fn verify_with_fallback(
        &self,
        receipt: &str,
    ) -> Result<VerifyReceiptResponse, VerificationError> {
        let response = self.call_verify(&self.production_url, receipt).await?;
        if response.status == SANDBOX_RECEIPT_STATUS {
            tracing::debug!("Sandbox receipt detected, retrying against sandbox endpoint");
            return self.call_verify(&self.sandbox_url, receipt).await;
        }
        Ok(response)
    }

    fn normalize_subscription(
        &self,
        response: &VerifyReceiptResponse,
        product_id: &str,
        product_class: ProductClass,
    ) -> Result<ValidatedTransaction, VerificationError> {
        let transactions = response
            .latest_receipt_info
            .as_deref()
            .unwrap_or_default();

        // Among transactions for this product, the one with the latest
        // expiry wins (renewals share a product id).
        let latest = transactions
            .iter()
            .filter(|t| t.product_id == product_id)
            .max_by_key(|t| t.expires_ms().unwrap_or(0))
            .ok_or_else(|| {
                VerificationError::Rejected(format!(
                    "no subscription transaction for product {}",
                    product_id
                ))
            })?;

        let expires_ms = latest.expires_ms().ok_or_else(|| {
            VerificationError::InvalidResponse("subscription transaction missing expiry".to_string())
        })?;
        let expires_at = Timestamp::from_unix_millis(expires_ms);

        let in_trial = latest.in_trial();
        let trial_window = if in_trial {
            latest.purchase_ms().map(|start| TrialWindow {
                start: Timestamp::from_unix_millis(start),
                end: expires_at,
            })
        } else {
            None
        };

        Ok(ValidatedTransaction {
            platform: Platform::Ios,
            product_id: product_id.to_string(),
            product_class,
            is_lifetime: false,
            expires_at: Some(expires_at),
            in_trial,
            trial_window,
            auto_renewing: auto_renewing_for(response, product_id),
            raw_status: response.status.to_string(),
        })
    }

    fn normalize_lifetime(
        &self,
        response: &VerifyReceiptResponse,
        product_id: &str,
    ) -> Result<ValidatedTransaction, VerificationError> {
        // Presence in the purchased-items array is sufficient for a
        // non-consumable; there is no expiry to check.
        let owned = response
            .receipt
            .as_ref()
            .map(|r| r.in_app.iter().any(|t| t.product_id == product_id))
            .unwrap_or(false);

        if !owned {
            return Err(VerificationError::Rejected(format!(
                "product {} not present in receipt",
                product_id
            )));
        }

        Ok(ValidatedTransaction {
            platform: Platform::Ios,
            product_id: product_id.to_string(),
            product_class: ProductClass::Lifetime,
            is_lifetime: true,
            expires_at: None,
            in_trial: false,
            trial_window: None,
            auto_renewing: false,
            raw_status: response.status.to_string(),
        })
    }
}

/// Auto-renew comes from a separate pending-renewal array keyed by
/// product id; absence means the platform has not flagged a turn-off,
/// so renewing is assumed.
fn auto_renewing_for(response: &VerifyReceiptResponse, product_id: &str) -> bool {
    response
        .pending_renewal_info
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| {
            r.product_id.as_deref() == Some(product_id)
                || r.auto_renew_product_id.as_deref() == Some(product_id)
        })
        .map(|r| r.auto_renew_status.as_deref() == Some("1"))
        .unwrap_or(true)
}

#[async_trait]
impl PurchaseVerifier for AppleReceiptVerifier {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<ValidatedTransaction, VerificationError> {
        let receipt = request
            .receipt
            .as_deref()
            .ok_or(VerificationError::MissingProof("receipt"))?;

        let response = self.verify_with_fallback(receipt).await?;
        if response.status != 0 {
            return Err(VerificationError::Rejected(format!(
                "verifyReceipt status {}",
                response.status
            )));
        }

        let product_class = ProductClass::classify(&request.product_id);
        if product_class.is_lifetime() {
            self.normalize_lifetime(&response, &request.product_id)
        } else {
            self.normalize_subscription(&response, &request.product_id, product_class)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_from(value: serde_json::Value) -> VerifyReceiptResponse {
        serde_json::from_value(value).unwrap()
    }

    fn verifier() -> AppleReceiptVerifier {
        AppleReceiptVerifier {
            shared_secret: SecretString::new("secret".to_string()),
            production_url: "https://prod.invalid/verifyReceipt".to_string(),
            sandbox_url: "https://sandbox.invalid/verifyReceipt".to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Subscription Normalization Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn picks_transaction_with_latest_expiry() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": [
                {"product_id": "premium_monthly", "expires_date_ms": "1000000", "purchase_date_ms": "500"},
                {"product_id": "premium_monthly", "expires_date_ms": "3000000", "purchase_date_ms": "2000"},
                {"product_id": "premium_monthly", "expires_date_ms": "2000000", "purchase_date_ms": "1000"}
            ]
        }));

        let tx = verifier()
            .normalize_subscription(&response, "premium_monthly", ProductClass::Monthly)
            .unwrap();

        assert_eq!(tx.expires_at.unwrap().as_unix_millis(), 3_000_000);
        assert!(!tx.in_trial);
        assert!(tx.auto_renewing); // no pending_renewal_info -> assume renewing
    }

    #[test]
    fn ignores_transactions_for_other_products() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": [
                {"product_id": "premium_annual", "expires_date_ms": "9000000"},
                {"product_id": "premium_monthly", "expires_date_ms": "1000000"}
            ]
        }));

        let tx = verifier()
            .normalize_subscription(&response, "premium_monthly", ProductClass::Monthly)
            .unwrap();

        assert_eq!(tx.expires_at.unwrap().as_unix_millis(), 1_000_000);
    }

    #[test]
    fn no_matching_transaction_is_rejected() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": []
        }));

        let result =
            verifier().normalize_subscription(&response, "premium_monthly", ProductClass::Monthly);
        assert!(matches!(result, Err(VerificationError::Rejected(_))));
    }

    #[test]
    fn trial_flag_comes_from_platform_strings() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": [{
                "product_id": "premium_annual",
                "expires_date_ms": "2000000",
                "purchase_date_ms": "1000000",
                "is_trial_period": "true"
            }]
        }));

        let tx = verifier()
            .normalize_subscription(&response, "premium_annual", ProductClass::Annual)
            .unwrap();

        assert!(tx.in_trial);
        let window = tx.trial_window.unwrap();
        assert_eq!(window.start.as_unix_millis(), 1_000_000);
        assert_eq!(window.end.as_unix_millis(), 2_000_000);
    }

    #[test]
    fn intro_offer_counts_as_trial() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": [{
                "product_id": "premium_annual",
                "expires_date_ms": "2000000",
                "is_in_intro_offer_period": "true"
            }]
        }));

        let tx = verifier()
            .normalize_subscription(&response, "premium_annual", ProductClass::Annual)
            .unwrap();
        assert!(tx.in_trial);
    }

    #[test]
    fn auto_renew_off_is_read_from_pending_renewal() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": [
                {"product_id": "premium_monthly", "expires_date_ms": "1000000"}
            ],
            "pending_renewal_info": [
                {"product_id": "premium_monthly", "auto_renew_status": "0"}
            ]
        }));

        let tx = verifier()
            .normalize_subscription(&response, "premium_monthly", ProductClass::Monthly)
            .unwrap();
        assert!(!tx.auto_renewing);
    }

    #[test]
    fn auto_renew_matches_on_auto_renew_product_id() {
        let response = response_from(json!({
            "status": 0,
            "latest_receipt_info": [
                {"product_id": "premium_monthly", "expires_date_ms": "1000000"}
            ],
            "pending_renewal_info": [
                {"auto_renew_product_id": "premium_monthly", "auto_renew_status": "1"}
            ]
        }));

        let tx = verifier()
            .normalize_subscription(&response, "premium_monthly", ProductClass::Monthly)
            .unwrap();
        assert!(tx.auto_renewing);
    }

    // ══════════════════════════════════════════════════════════════
    // Lifetime Normalization Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn lifetime_presence_in_receipt_is_success() {
        let response = response_from(json!({
            "status": 0,
            "receipt": {
                "in_app": [
                    {"product_id": "premium_lifetime"}
                ]
            }
        }));

        let tx = verifier()
            .normalize_lifetime(&response, "premium_lifetime")
            .unwrap();

        assert!(tx.is_lifetime);
        assert_eq!(tx.expires_at, None);
        assert_eq!(tx.product_class, ProductClass::Lifetime);
        assert!(!tx.auto_renewing);
    }

    #[test]
    fn lifetime_absence_is_rejected() {
        let response = response_from(json!({
            "status": 0,
            "receipt": {"in_app": []}
        }));

        let result = verifier().normalize_lifetime(&response, "premium_lifetime");
        assert!(matches!(result, Err(VerificationError::Rejected(_))));
    }

    // ══════════════════════════════════════════════════════════════
    // Sandbox Fallback Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn sandbox_redirect_retries_sandbox_exactly_once() {
        // Wire-level test: the production mock answers 21007, the sandbox
        // mock answers a valid subscription; the verifier must use the
        // sandbox result and call each endpoint once.
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let prod_hits = Arc::new(AtomicU32::new(0));
        let sandbox_hits = Arc::new(AtomicU32::new(0));

        let prod_counter = prod_hits.clone();
        let sandbox_counter = sandbox_hits.clone();

        let app = axum::Router::new()
            .route(
                "/prod/verifyReceipt",
                axum::routing::post(move || {
                    prod_counter.fetch_add(1, Ordering::SeqCst);
                    async { axum::Json(serde_json::json!({"status": 21007})) }
                }),
            )
            .route(
                "/sandbox/verifyReceipt",
                axum::routing::post(move || {
                    sandbox_counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        axum::Json(serde_json::json!({
                            "status": 0,
                            "latest_receipt_info": [
                                {"product_id": "premium_monthly", "expires_date_ms": "99999999999999"}
                            ]
                        }))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let verifier = AppleReceiptVerifier {
            shared_secret: SecretString::new("secret".to_string()),
            production_url: format!("http://{}/prod/verifyReceipt", addr),
            sandbox_url: format!("http://{}/sandbox/verifyReceipt", addr),
            http_client: reqwest::Client::new(),
        };

        let request = VerifyRequest::with_receipt("premium_monthly", "base64receipt==");
        let tx = verifier.verify(&request).await.unwrap();

        assert_eq!(prod_hits.load(Ordering::SeqCst), 1);
        assert_eq!(sandbox_hits.load(Ordering::SeqCst), 1);
        assert!(tx.expires_at.is_some());
    }

    #[tokio::test]
    async fn non_zero_status_is_hard_rejection() {
        let app = axum::Router::new().route(
            "/prod/verifyReceipt",
            axum::routing::post(|| async {
                axum::Json(serde_json::json!({"status": 21003}))
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let verifier = AppleReceiptVerifier {
            shared_secret: SecretString::new("secret".to_string()),
            production_url: format!("http://{}/prod/verifyReceipt", addr),
            sandbox_url: format!("http://{}/unused", addr),
            http_client: reqwest::Client::new(),
        };

        let request = VerifyRequest::with_receipt("premium_monthly", "base64receipt==");
        let result = verifier.verify(&request).await;
        assert!(matches!(result, Err(VerificationError::Rejected(reason)) if reason.contains("21003")));
    }

    #[tokio::test]
    async fn missing_receipt_fails_before_any_call() {
        let request = VerifyRequest {
            product_id: "premium_monthly".to_string(),
            receipt: None,
            purchase_token: Some("android-token".to_string()),
        };

        let result = verifier().verify(&request).await;
        assert!(matches!(result, Err(VerificationError::MissingProof("receipt"))));
    }
}
