//! Google Play Developer API client.
//!
//! Verifies purchase tokens against the Android Publisher API. Renewing
//! subscriptions use the v1 subscriptions resource; its `paymentState`
//! enum is the authoritative trial signal (2 = free trial). The v2
//! resource's offer tags describe the *offer's* type, not the
//! purchaser's current state, so they are only consulted as a secondary
//! signal when v1 omits `paymentState`. One-time products use the
//! products resource, where `purchaseState` 0 means purchased.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GoogleConfig;
use crate::domain::entitlement::{Platform, ProductClass, TrialWindow, ValidatedTransaction};
use crate::domain::foundation::Timestamp;
use crate::ports::{PurchaseVerifier, VerificationError, VerifyRequest};

use super::token::AccessTokenProvider;

/// v1 paymentState value meaning "free trial".
const PAYMENT_STATE_FREE_TRIAL: i64 = 2;

/// products resource purchaseState value meaning "purchased".
const PURCHASE_STATE_PURCHASED: i64 = 0;

/// Offer tags that mark a trial offer (v2 secondary signal).
const TRIAL_OFFER_TAGS: [&str; 2] = ["free-trial", "trial"];

/// Verifier for Google Play purchase tokens.
pub struct GooglePlayVerifier {
    package_name: String,
    api_base_url: String,
    token_provider: Arc<dyn AccessTokenProvider>,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPurchase {
    expiry_time_millis: Option<String>,
    start_time_millis: Option<String>,
    #[serde(default)]
    auto_renewing: bool,
    payment_state: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPurchaseV2 {
    #[serde(default)]
    line_items: Vec<SubscriptionLineItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionLineItem {
    product_id: String,
    offer_details: Option<OfferDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferDetails {
    #[serde(default)]
    offer_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductPurchase {
    purchase_state: Option<i64>,
}

impl GooglePlayVerifier {
    /// Creates a verifier from Google configuration and a token provider.
    pub fn new(config: &GoogleConfig, token_provider: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            package_name: config.package_name.clone(),
            api_base_url: config.api_base_url.clone(),
            token_provider,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, VerificationError> {
        let token = self.token_provider.access_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VerificationError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            // The API examined the token/product pair and said no.
            let body = response.text().await.unwrap_or_default();
            return Err(VerificationError::Rejected(format!(
                "Play API returned {}: {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(VerificationError::Http(format!(
                "Play API returned {}",
                status
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| VerificationError::InvalidResponse(e.to_string()))
    }

    async fn get_subscription(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<SubscriptionPurchase, VerificationError> {
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/subscriptions/{}/tokens/{}",
            self.api_base_url, self.package_name, product_id, purchase_token
        );
        self.get_json(&url).await
    }

    async fn get_subscription_v2(
        &self,
        purchase_token: &str,
    ) -> Result<SubscriptionPurchaseV2, VerificationError> {
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/subscriptionsv2/tokens/{}",
            self.api_base_url, self.package_name, purchase_token
        );
        self.get_json(&url).await
    }

    async fn get_product(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<ProductPurchase, VerificationError> {
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/products/{}/tokens/{}",
            self.api_base_url, self.package_name, product_id, purchase_token
        );
        self.get_json(&url).await
    }

    async fn verify_subscription(
        &self,
        product_id: &str,
        purchase_token: &str,
        product_class: ProductClass,
    ) -> Result<ValidatedTransaction, VerificationError> {
        let purchase = self.get_subscription(product_id, purchase_token).await?;

        let expiry_ms: i64 = purchase
            .expiry_time_millis
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                VerificationError::InvalidResponse("subscription missing expiryTimeMillis".to_string())
            })?;
        let expires_at = Timestamp::from_unix_millis(expiry_ms);

        let in_trial = match purchase.payment_state {
            Some(state) => state == PAYMENT_STATE_FREE_TRIAL,
            None => self.trial_by_offer_tags(product_id, purchase_token).await,
        };

        let trial_window = if in_trial {
            purchase
                .start_time_millis
                .as_deref()
                .and_then(|s| s.parse().ok())
                .map(|start: i64| TrialWindow {
                    start: Timestamp::from_unix_millis(start),
                    end: expires_at,
                })
        } else {
            None
        };

        Ok(ValidatedTransaction {
            platform: Platform::Android,
            product_id: product_id.to_string(),
            product_class,
            is_lifetime: false,
            expires_at: Some(expires_at),
            in_trial,
            trial_window,
            auto_renewing: purchase.auto_renewing,
            raw_status: purchase
                .payment_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Secondary trial signal from v2 offer tags, used only when v1
    /// omits `paymentState`. A v2 failure here degrades to "not a
    /// trial" rather than failing the whole verification.
    async fn trial_by_offer_tags(&self, product_id: &str, purchase_token: &str) -> bool {
        match self.get_subscription_v2(purchase_token).await {
            Ok(v2) => v2
                .line_items
                .iter()
                .filter(|item| item.product_id == product_id)
                .filter_map(|item| item.offer_details.as_ref())
                .flat_map(|details| details.offer_tags.iter())
                .any(|tag| TRIAL_OFFER_TAGS.contains(&tag.as_str())),
            Err(e) => {
                tracing::warn!(error = %e, "subscriptionsv2 lookup failed, assuming non-trial");
                false
            }
        }
    }

    async fn verify_product(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<ValidatedTransaction, VerificationError> {
        let purchase = self.get_product(product_id, purchase_token).await?;

        if purchase.purchase_state != Some(PURCHASE_STATE_PURCHASED) {
            return Err(VerificationError::Rejected(format!(
                "purchaseState {:?}",
                purchase.purchase_state
            )));
        }

        Ok(ValidatedTransaction {
            platform: Platform::Android,
            product_id: product_id.to_string(),
            product_class: ProductClass::Lifetime,
            is_lifetime: true,
            expires_at: None,
            in_trial: false,
            trial_window: None,
            auto_renewing: false,
            raw_status: PURCHASE_STATE_PURCHASED.to_string(),
        })
    }
}

#[async_trait]
impl PurchaseVerifier for GooglePlayVerifier {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<ValidatedTransaction, VerificationError> {
        let purchase_token = request
            .purchase_token
            .as_deref()
            .ok_or(VerificationError::MissingProof("purchase_token"))?;

        let product_class = ProductClass::classify(&request.product_id);
        if product_class.is_lifetime() {
            self.verify_product(&request.product_id, purchase_token).await
        } else {
            self.verify_subscription(&request.product_id, purchase_token, product_class)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    struct StaticTokenProvider;

    #[async_trait]
    impl AccessTokenProvider for StaticTokenProvider {
        async fn access_token(&self) -> Result<String, VerificationError> {
            Ok("test-bearer-token".to_string())
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn verifier(base_url: String) -> GooglePlayVerifier {
        GooglePlayVerifier {
            package_name: "com.quillchat.android".to_string(),
            api_base_url: base_url,
            token_provider: Arc::new(StaticTokenProvider),
            http_client: reqwest::Client::new(),
        }
    }

    const SUB_V1: &str = "/androidpublisher/v3/applications/com.quillchat.android/purchases/subscriptions/:product/tokens/:token";
    const SUB_V2: &str = "/androidpublisher/v3/applications/com.quillchat.android/purchases/subscriptionsv2/tokens/:token";
    const PRODUCT: &str = "/androidpublisher/v3/applications/com.quillchat.android/purchases/products/:product/tokens/:token";

    // ══════════════════════════════════════════════════════════════
    // Subscription Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_subscription_normalizes() {
        let app = Router::new().route(
            SUB_V1,
            get(|| async {
                Json(json!({
                    "expiryTimeMillis": "4102444800000",
                    "startTimeMillis": "1704067200000",
                    "autoRenewing": true,
                    "paymentState": 1
                }))
            }),
        );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_monthly", "tok123");
        let tx = verifier(base).verify(&request).await.unwrap();

        assert_eq!(tx.platform, Platform::Android);
        assert!(!tx.in_trial);
        assert!(tx.auto_renewing);
        assert_eq!(tx.expires_at.unwrap().as_unix_millis(), 4_102_444_800_000);
    }

    #[tokio::test]
    async fn payment_state_two_means_free_trial() {
        let app = Router::new().route(
            SUB_V1,
            get(|| async {
                Json(json!({
                    "expiryTimeMillis": "4102444800000",
                    "startTimeMillis": "1704067200000",
                    "autoRenewing": true,
                    "paymentState": 2
                }))
            }),
        );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_annual", "tok123");
        let tx = verifier(base).verify(&request).await.unwrap();

        assert!(tx.in_trial);
        let window = tx.trial_window.unwrap();
        assert_eq!(window.start.as_unix_millis(), 1_704_067_200_000);
        assert_eq!(window.end.as_unix_millis(), 4_102_444_800_000);
    }

    #[tokio::test]
    async fn offer_tags_are_only_a_fallback_signal() {
        // paymentState present and != 2: the v2 offer tags must NOT
        // override it, even if the offer was a trial offer.
        let app = Router::new()
            .route(
                SUB_V1,
                get(|| async {
                    Json(json!({
                        "expiryTimeMillis": "4102444800000",
                        "autoRenewing": true,
                        "paymentState": 1
                    }))
                }),
            )
            .route(
                SUB_V2,
                get(|| async {
                    Json(json!({
                        "lineItems": [{
                            "productId": "premium_monthly",
                            "offerDetails": {"offerTags": ["free-trial"]}
                        }]
                    }))
                }),
            );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_monthly", "tok123");
        let tx = verifier(base).verify(&request).await.unwrap();
        assert!(!tx.in_trial);
    }

    #[tokio::test]
    async fn missing_payment_state_falls_back_to_offer_tags() {
        let app = Router::new()
            .route(
                SUB_V1,
                get(|| async {
                    Json(json!({
                        "expiryTimeMillis": "4102444800000",
                        "startTimeMillis": "1704067200000",
                        "autoRenewing": true
                    }))
                }),
            )
            .route(
                SUB_V2,
                get(|| async {
                    Json(json!({
                        "lineItems": [{
                            "productId": "premium_monthly",
                            "offerDetails": {"offerTags": ["free-trial"]}
                        }]
                    }))
                }),
            );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_monthly", "tok123");
        let tx = verifier(base).verify(&request).await.unwrap();
        assert!(tx.in_trial);
    }

    #[tokio::test]
    async fn missing_expiry_is_invalid_response() {
        let app = Router::new().route(
            SUB_V1,
            get(|| async { Json(json!({"autoRenewing": false})) }),
        );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_monthly", "tok123");
        let result = verifier(base).verify(&request).await;
        assert!(matches!(result, Err(VerificationError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn client_error_from_api_is_rejection() {
        let app = Router::new().route(
            SUB_V1,
            get(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid purchase token"})),
                )
            }),
        );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_monthly", "bad-token");
        let result = verifier(base).verify(&request).await;
        assert!(matches!(result, Err(VerificationError::Rejected(_))));
    }

    // ══════════════════════════════════════════════════════════════
    // One-Time Product Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn purchased_lifetime_product_normalizes() {
        let app = Router::new().route(
            PRODUCT,
            get(|| async { Json(json!({"purchaseState": 0})) }),
        );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_lifetime", "tok123");
        let tx = verifier(base).verify(&request).await.unwrap();

        assert!(tx.is_lifetime);
        assert_eq!(tx.expires_at, None);
        assert_eq!(tx.product_class, ProductClass::Lifetime);
        assert_eq!(tx.raw_status, "0");
    }

    #[tokio::test]
    async fn pending_product_is_rejected() {
        let app = Router::new().route(
            PRODUCT,
            get(|| async { Json(json!({"purchaseState": 2})) }),
        );
        let base = serve(app).await;

        let request = VerifyRequest::with_purchase_token("premium_lifetime", "tok123");
        let result = verifier(base).verify(&request).await;
        assert!(matches!(result, Err(VerificationError::Rejected(_))));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_call() {
        let request = VerifyRequest::with_receipt("premium_monthly", "receipt==");
        let result = verifier("http://unused.invalid".to_string())
            .verify(&request)
            .await;
        assert!(matches!(
            result,
            Err(VerificationError::MissingProof("purchase_token"))
        ));
    }
}
