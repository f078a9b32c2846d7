//! Stripe webhook signature verification.
//!
//! HMAC-SHA256 over the raw request body with timestamp validation to
//! prevent replay. A mismatch is a hard 400: Stripe retries non-2xx with
//! backoff, which is the desired behavior for a transient verification
//! issue.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::StripeEvent;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Errors that occur during webhook verification and processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the acceptable window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Failed to parse the signature header or JSON payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Event verified but processing failed downstream.
    #[error("Processing failed: {0}")]
    Processing(String),
}

impl WebhookError {
    /// Maps the error to the HTTP status Stripe should see.
    ///
    /// Signature and parse failures are 400 (Stripe retries with
    /// backoff); processing failures are 500 (also retried).
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,
            WebhookError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Parsed components from the Stripe-Signature header.
///
/// Format: `t=<timestamp>,v1=<signature>[,v0=<legacy>]`; unknown fields
/// are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// v1 signature (HMAC-SHA256).
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses a Stripe-Signature header string.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ParseError` if the header format is invalid.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        let v1_signature = v1_signature
            .ok_or_else(|| WebhookError::ParseError("missing v1 signature".to_string()))?;

        Ok(SignatureHeader {
            timestamp,
            v1_signature,
        })
    }
}

/// Verifier for Stripe webhook signatures.
pub struct StripeWebhookVerifier {
    secret: SecretString,
    require_livemode: bool,
}

impl StripeWebhookVerifier {
    /// Creates a new verifier with the given webhook signing secret.
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            require_livemode: false,
        }
    }

    /// Reject test-mode events (production deployments).
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    /// Verifies the webhook signature and parses the event.
    ///
    /// 1. Parse the signature header
    /// 2. Validate the timestamp window
    /// 3. Recompute HMAC-SHA256 over `"{t}.{body}"`
    /// 4. Constant-time compare
    /// 5. Parse the JSON payload
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` - signature mismatch
    /// - `TimestampOutOfRange` - event outside the tolerance window
    /// - `ParseError` - malformed header or payload
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        self.validate_timestamp(header.timestamp)?;

        let expected = self.compute_signature(header.timestamp, payload);
        if !constant_time_compare(&expected, &header.v1_signature) {
            tracing::warn!("Stripe webhook signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event in production");
            return Err(WebhookError::ParseError(
                "test mode events not allowed".to_string(),
            ));
        }

        Ok(event)
    }

    /// Validates that the timestamp is within acceptable bounds.
    fn validate_timestamp(&self, timestamp: i64) -> Result<(), WebhookError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > MAX_EVENT_AGE_SECS || age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::TimestampOutOfRange);
        }

        Ok(())
    }

    /// Computes the HMAC-SHA256 signature for the given timestamp and payload.
    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key");
        mac.update(signed_payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes a hex HMAC-SHA256 for use in test fixtures.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, timestamp: i64, payload: &str) -> String {
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
