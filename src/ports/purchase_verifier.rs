//! Purchase verification port.
//!
//! The single normalized-transaction interface every platform verifier
//! implements, so the deriver and handlers never touch wire formats.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entitlement::{Platform, ValidatedTransaction};

/// A client-supplied proof of purchase to verify.
///
/// Mirrors the validation RPC: iOS callers send a base64 receipt,
/// Android callers a Play purchase token. Verifiers take what they need
/// and reject requests missing their proof kind before any external call.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub product_id: String,
    pub receipt: Option<String>,
    pub purchase_token: Option<String>,
}

impl VerifyRequest {
    pub fn with_receipt(product_id: impl Into<String>, receipt: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            receipt: Some(receipt.into()),
            purchase_token: None,
        }
    }

    pub fn with_purchase_token(
        product_id: impl Into<String>,
        purchase_token: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            receipt: None,
            purchase_token: Some(purchase_token.into()),
        }
    }
}

/// Errors from purchase verification.
#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    /// The request is missing the proof this platform requires. Rejected
    /// before any external call.
    #[error("Missing {0}")]
    MissingProof(&'static str),

    /// The platform examined the proof and rejected it (bad receipt,
    /// non-zero status, unpurchased product).
    #[error("Rejected by platform: {0}")]
    Rejected(String),

    /// Transport failure reaching the platform API.
    #[error("Platform request failed: {0}")]
    Http(String),

    /// The platform responded with an unparseable or incomplete body.
    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),
}

/// Port for platform purchase verifiers.
#[async_trait]
pub trait PurchaseVerifier: Send + Sync {
    /// The platform this verifier speaks to.
    fn platform(&self) -> Platform;

    /// Verifies a proof of purchase and normalizes the result.
    ///
    /// # Errors
    ///
    /// See [`VerificationError`]; `Rejected` means the platform made a
    /// decision, the other variants mean no decision was reached.
    async fn verify(&self, request: &VerifyRequest)
        -> Result<ValidatedTransaction, VerificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_verifier_is_object_safe() {
        fn _accepts_dyn(_verifier: &dyn PurchaseVerifier) {}
    }

    #[test]
    fn request_constructors_set_one_proof() {
        let ios = VerifyRequest::with_receipt("premium_monthly", "b64==");
        assert!(ios.receipt.is_some());
        assert!(ios.purchase_token.is_none());

        let android = VerifyRequest::with_purchase_token("premium_monthly", "token");
        assert!(android.receipt.is_none());
        assert!(android.purchase_token.is_some());
    }
}
