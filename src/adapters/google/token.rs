//! Google service-account token exchange.
//!
//! Signs an RS256 JWT assertion with the service-account key and
//! exchanges it at the OAuth2 token endpoint for a bearer token scoped
//! to the Android Publisher API. Tokens are cached until shortly before
//! expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::GoogleConfig;
use crate::ports::VerificationError;

/// Source of bearer tokens for the Play Developer API.
///
/// A seam between the verifier and the credential exchange so tests can
/// supply tokens without service-account material.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, VerificationError>;
}

/// OAuth scope for the Android Publisher API.
const ANDROID_PUBLISHER_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";

/// Assertion lifetime in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh the cached token this long before it actually expires.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    fetched_at: Instant,
    lifetime: Duration,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        let margin = Duration::from_secs(EXPIRY_MARGIN_SECS);
        self.fetched_at.elapsed() + margin < self.lifetime
    }
}

/// Exchanges service-account credentials for cached access tokens.
pub struct ServiceAccountTokenProvider {
    service_account_email: String,
    private_key: SecretString,
    token_url: String,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
}

impl ServiceAccountTokenProvider {
    /// Creates a provider from Google configuration.
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            service_account_email: config.service_account_email.clone(),
            private_key: config.private_key.clone(),
            token_url: config.token_url.clone(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            cache: RwLock::new(None),
        }
    }

    fn signed_assertion(&self) -> Result<String, VerificationError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.service_account_email,
            scope: ANDROID_PUBLISHER_SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| {
                VerificationError::InvalidResponse(format!("invalid service account key: {}", e))
            })?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| VerificationError::InvalidResponse(format!("assertion signing: {}", e)))
    }

    async fn fetch_token(&self) -> Result<CachedToken, VerificationError> {
        let assertion = self.signed_assertion()?;

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| VerificationError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Google token exchange failed");
            return Err(VerificationError::Http(format!(
                "token exchange returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::InvalidResponse(e.to_string()))?;

        Ok(CachedToken {
            access_token: token.access_token,
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountTokenProvider {
    /// Returns a bearer token, reusing the cached one while fresh.
    async fn access_token(&self) -> Result<String, VerificationError> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.as_ref() {
                if token.is_fresh() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();

        let mut cache = self.cache.write().await;
        *cache = Some(token);

        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_within_lifetime() {
        let token = CachedToken {
            access_token: "t".to_string(),
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(3600),
        };
        assert!(token.is_fresh());
    }

    #[test]
    fn token_near_expiry_is_stale() {
        let token = CachedToken {
            access_token: "t".to_string(),
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(30), // inside the 60s margin
        };
        assert!(!token.is_fresh());
    }

    #[test]
    fn invalid_pem_fails_signing() {
        let provider = ServiceAccountTokenProvider {
            service_account_email: "svc@test.iam.gserviceaccount.com".to_string(),
            private_key: SecretString::new("not a pem".to_string()),
            token_url: "https://oauth2.invalid/token".to_string(),
            http_client: reqwest::Client::new(),
            cache: RwLock::new(None),
        };
        assert!(provider.signed_assertion().is_err());
    }
}
