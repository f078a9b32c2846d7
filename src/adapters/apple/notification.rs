//! App Store Server Notification V2 verification.
//!
//! Notifications arrive as a JWS whose x5c header carries the signing
//! certificate chain. Trust comes from pinning: the chain anchor must
//! byte-match one of the Apple root certificates in configuration, and
//! the ES256 signature is checked against the leaf key. The nested
//! `signedTransactionInfo` and `signedRenewalInfo` payloads are verified
//! the same way, independently.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{AppleConfig, ValidationError};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AppleNotification, AppleNotificationVerifier, AppleTransactionInfo, NotificationError,
};

/// Offer discount type for a free trial.
const OFFER_DISCOUNT_TYPE_FREE_TRIAL: &str = "FREE_TRIAL";

/// Verifier for Apple signed notification payloads.
pub struct JwsNotificationVerifier {
    bundle_id: String,
    environment: String,
    /// Pinned Apple root certificates, DER bytes.
    root_certificates: Vec<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
struct ResponseBodyV2DecodedPayload {
    #[serde(rename = "notificationType")]
    notification_type: String,
    subtype: Option<String>,
    #[serde(rename = "notificationUUID")]
    notification_uuid: String,
    data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
struct NotificationData {
    #[serde(rename = "bundleId")]
    bundle_id: String,
    environment: String,
    #[serde(rename = "signedTransactionInfo")]
    signed_transaction_info: Option<String>,
    #[serde(rename = "signedRenewalInfo")]
    signed_renewal_info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwsTransactionDecodedPayload {
    #[serde(rename = "productId")]
    product_id: String,
    #[serde(rename = "originalTransactionId")]
    original_transaction_id: String,
    #[serde(rename = "expiresDate")]
    expires_date: Option<i64>,
    #[serde(rename = "appAccountToken")]
    app_account_token: Option<String>,
    #[serde(rename = "offerDiscountType")]
    offer_discount_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwsRenewalInfoDecodedPayload {
    #[serde(rename = "autoRenewStatus")]
    auto_renew_status: Option<i64>,
}

impl JwsNotificationVerifier {
    /// Creates a verifier from Apple configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a configured root certificate is
    /// not valid base64.
    pub fn new(config: &AppleConfig) -> Result<Self, ValidationError> {
        let root_certificates = config
            .root_certificate_list()
            .iter()
            .map(|b64| {
                STANDARD
                    .decode(b64)
                    .map_err(|_| ValidationError::InvalidAppleRootCertificate)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bundle_id: config.bundle_id.clone(),
            environment: config.environment.clone(),
            root_certificates,
        })
    }

    /// Verifies one JWS against the pinned roots and decodes its claims.
    fn verify_jws<T: DeserializeOwned>(&self, jws: &str) -> Result<T, NotificationError> {
        let header = decode_header(jws)
            .map_err(|e| NotificationError::MalformedPayload(e.to_string()))?;

        if header.alg != Algorithm::ES256 {
            return Err(NotificationError::MalformedPayload(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let chain = header.x5c.ok_or_else(|| {
            NotificationError::MalformedPayload("missing x5c certificate chain".to_string())
        })?;
        if chain.len() < 2 {
            return Err(NotificationError::UntrustedChain(
                "chain too short".to_string(),
            ));
        }

        let chain_der = chain
            .iter()
            .map(|b64| {
                STANDARD
                    .decode(b64)
                    .map_err(|e| NotificationError::MalformedPayload(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.check_anchor(&chain_der)?;

        let leaf_key = extract_p256_public_key(&chain_der[0]).ok_or_else(|| {
            NotificationError::MalformedPayload("no P-256 key in leaf certificate".to_string())
        })?;

        let mut validation = Validation::new(Algorithm::ES256);
        // Apple transaction payloads carry no exp/aud claims.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<T>(jws, &DecodingKey::from_ec_der(&leaf_key), &validation)
            .map_err(|e| NotificationError::SignatureInvalid(e.to_string()))?;

        Ok(data.claims)
    }

    /// The chain anchor must byte-match a pinned Apple root.
    fn check_anchor(&self, chain_der: &[Vec<u8>]) -> Result<(), NotificationError> {
        if self.root_certificates.is_empty() {
            return Err(NotificationError::UntrustedChain(
                "no pinned root certificates configured".to_string(),
            ));
        }
        let anchor = chain_der.last().expect("chain checked non-empty");
        if !self.root_certificates.iter().any(|root| root == anchor) {
            return Err(NotificationError::UntrustedChain(
                "anchor does not match any pinned root".to_string(),
            ));
        }
        Ok(())
    }

    fn check_identifiers(&self, data: &NotificationData) -> Result<(), NotificationError> {
        if data.bundle_id != self.bundle_id {
            return Err(NotificationError::BundleMismatch {
                expected: self.bundle_id.clone(),
                actual: data.bundle_id.clone(),
            });
        }
        if !data.environment.eq_ignore_ascii_case(&self.environment) {
            return Err(NotificationError::EnvironmentMismatch {
                expected: self.environment.clone(),
                actual: data.environment.clone(),
            });
        }
        Ok(())
    }
}

impl AppleNotificationVerifier for JwsNotificationVerifier {
    fn verify(&self, signed_payload: &str) -> Result<AppleNotification, NotificationError> {
        let payload: ResponseBodyV2DecodedPayload = self.verify_jws(signed_payload)?;

        let Some(data) = payload.data else {
            // TEST notifications and some administrative types carry no data.
            return Ok(AppleNotification {
                notification_type: payload.notification_type,
                subtype: payload.subtype,
                notification_uuid: payload.notification_uuid,
                bundle_id: String::new(),
                environment: String::new(),
                transaction: None,
            });
        };

        self.check_identifiers(&data)?;

        // The nested transaction payload is verified independently of the
        // outer envelope; either can fail on its own.
        let transaction = match &data.signed_transaction_info {
            Some(jws) => {
                let tx: JwsTransactionDecodedPayload = self.verify_jws(jws)?;
                let auto_renewing = match &data.signed_renewal_info {
                    Some(renewal_jws) => {
                        let renewal: JwsRenewalInfoDecodedPayload =
                            self.verify_jws(renewal_jws)?;
                        renewal.auto_renew_status.map(|s| s == 1)
                    }
                    None => None,
                };
                Some(AppleTransactionInfo {
                    product_id: tx.product_id,
                    original_transaction_id: tx.original_transaction_id,
                    expires_date: tx.expires_date.map(Timestamp::from_unix_millis),
                    app_account_token: tx.app_account_token,
                    in_trial: tx.offer_discount_type.as_deref()
                        == Some(OFFER_DISCOUNT_TYPE_FREE_TRIAL),
                    auto_renewing,
                })
            }
            None => None,
        };

        Ok(AppleNotification {
            notification_type: payload.notification_type,
            subtype: payload.subtype,
            notification_uuid: payload.notification_uuid,
            bundle_id: data.bundle_id,
            environment: data.environment,
            transaction,
        })
    }
}

/// Extracts the uncompressed P-256 public key point from a DER
/// certificate.
///
/// Apple's App Store signing leaf certificates always carry prime256v1
/// keys, whose SubjectPublicKeyInfo embeds the point as the BIT STRING
/// `03 42 00 04 || x || y`. Scanning for that encoding avoids a full
/// X.509 parse; the subsequent signature check fails closed if the
/// scan ever picked up the wrong bytes.
fn extract_p256_public_key(cert_der: &[u8]) -> Option<Vec<u8>> {
    const PREFIX: [u8; 4] = [0x03, 0x42, 0x00, 0x04];
    const POINT_LEN: usize = 65;

    cert_der
        .windows(PREFIX.len())
        .position(|w| w == PREFIX)
        .and_then(|pos| {
            let start = pos + PREFIX.len() - 1; // keep the 0x04 point tag
            cert_der.get(start..start + POINT_LEN).map(|p| p.to_vec())
        })
}
