//! ValidatePurchaseHandler - client-invoked purchase validation.
//!
//! The synchronous verify -> derive -> persist path: an authenticated
//! client submits a receipt or purchase token, gets back the resulting
//! entitlement so it can update its local view without waiting for a
//! platform push.

use std::sync::Arc;

use serde::Serialize;

use crate::application::TrialLedgerService;
use crate::domain::entitlement::{
    derive, EntitlementError, EntitlementRecord, MembershipStatus, Platform, ProductClass,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::trial::TrialHistory;
use crate::ports::{EntitlementStore, PurchaseVerifier, VerificationError, VerifyRequest};

/// Command to validate a purchase for an authenticated user.
#[derive(Debug, Clone)]
pub struct ValidatePurchaseCommand {
    pub user_id: UserId,
    /// Caller email from the auth token; feeds the trial ledger.
    pub email: Option<String>,
    pub platform: Platform,
    pub product_id: String,
    pub receipt: Option<String>,
    pub purchase_token: Option<String>,
    /// Opaque token the client registered with the store platform, so
    /// later server notifications can be linked back to this user.
    pub platform_account_token: Option<String>,
}

/// The entitlement as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    pub valid: bool,
    pub membership_status: MembershipStatus,
    pub expiry_date: Option<Timestamp>,
    pub trial_start_date: Option<Timestamp>,
    pub trial_end_date: Option<Timestamp>,
    pub auto_renewing: bool,
    pub product_id: Option<ProductClass>,
    pub has_used_trial: bool,
    pub is_lifetime: bool,
}

impl From<&EntitlementRecord> for EntitlementView {
    fn from(record: &EntitlementRecord) -> Self {
        Self {
            valid: record.is_premium,
            membership_status: record.membership_status,
            expiry_date: record.expires_at,
            trial_start_date: record.trial_start,
            trial_end_date: record.trial_end,
            auto_renewing: record.auto_renewing,
            product_id: record.product_class,
            has_used_trial: record.has_used_trial,
            is_lifetime: record.is_lifetime,
        }
    }
}

/// Handler for client-invoked purchase validation.
pub struct ValidatePurchaseHandler {
    entitlement_store: Arc<dyn EntitlementStore>,
    trial_ledger: Arc<TrialLedgerService>,
    apple_verifier: Arc<dyn PurchaseVerifier>,
    google_verifier: Arc<dyn PurchaseVerifier>,
}

impl ValidatePurchaseHandler {
    pub fn new(
        entitlement_store: Arc<dyn EntitlementStore>,
        trial_ledger: Arc<TrialLedgerService>,
        apple_verifier: Arc<dyn PurchaseVerifier>,
        google_verifier: Arc<dyn PurchaseVerifier>,
    ) -> Self {
        Self {
            entitlement_store,
            trial_ledger,
            apple_verifier,
            google_verifier,
        }
    }

    /// Runs the full validation flow.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` - bad platform/product/proof, rejected before
    ///   any external call
    /// - `TrialAlreadyUsed` - the fraud case; nothing is persisted
    /// - `VerificationFailed` - the platform rejected the proof
    /// - `Infrastructure` - store or outbound transport failure
    pub async fn handle(
        &self,
        cmd: ValidatePurchaseCommand,
    ) -> Result<EntitlementView, EntitlementError> {
        let verifier = self.validate_arguments(&cmd)?;
        let now = Timestamp::now();

        let prior = self.entitlement_store.get_entitlement(&cmd.user_id).await?;

        // Lifetime entitlements skip re-validation entirely: ownership is
        // established and cannot lapse, so no platform call is made.
        if let Some(record) = prior.as_ref() {
            if record.is_lifetime {
                tracing::debug!(user_id = %cmd.user_id, "lifetime entitlement cached, skipping verification");
                return Ok(EntitlementView::from(record));
            }
        }

        let request = VerifyRequest {
            product_id: cmd.product_id.clone(),
            receipt: cmd.receipt.clone(),
            purchase_token: cmd.purchase_token.clone(),
        };
        let validated = verifier
            .verify(&request)
            .await
            .map_err(|e| map_verification_error(cmd.platform, e))?;

        let history: Option<TrialHistory> = if validated.in_trial {
            Some(
                self.trial_ledger
                    .check_trial_history(&cmd.user_id, cmd.email.as_deref())
                    .await?,
            )
        } else {
            None
        };

        let mut derivation = derive(&validated, history.as_ref(), prior.as_ref(), now)?;
        if let Some(token) = &cmd.platform_account_token {
            derivation.patch.platform_account_token = Some(token.clone());
        }

        self.entitlement_store
            .merge_entitlement(&cmd.user_id, &derivation.patch)
            .await?;

        // Separate write, after the merge: a crash here leaves a granted
        // trial without a ledger entry, the accepted gap.
        if derivation.record_trial {
            self.trial_ledger
                .record_trial_usage(&cmd.user_id, cmd.email.as_deref(), now)
                .await?;
        }

        let merged = prior
            .unwrap_or_else(|| EntitlementRecord::demo(cmd.user_id.clone()))
            .merged_with(&derivation.patch);

        tracing::info!(
            user_id = %cmd.user_id,
            platform = %cmd.platform,
            status = %merged.membership_status,
            "purchase validated"
        );

        Ok(EntitlementView::from(&merged))
    }

    /// Rejects caller input errors before any external call is made.
    fn validate_arguments(
        &self,
        cmd: &ValidatePurchaseCommand,
    ) -> Result<&Arc<dyn PurchaseVerifier>, EntitlementError> {
        if cmd.product_id.trim().is_empty() {
            return Err(EntitlementError::invalid_argument(
                "product_id",
                "must not be empty",
            ));
        }

        match cmd.platform {
            Platform::Ios => {
                if cmd.receipt.as_deref().unwrap_or("").is_empty() {
                    return Err(EntitlementError::invalid_argument(
                        "receipt",
                        "required for ios validation",
                    ));
                }
                Ok(&self.apple_verifier)
            }
            Platform::Android => {
                if cmd.purchase_token.as_deref().unwrap_or("").is_empty() {
                    return Err(EntitlementError::invalid_argument(
                        "purchase_token",
                        "required for android validation",
                    ));
                }
                Ok(&self.google_verifier)
            }
            Platform::Stripe => Err(EntitlementError::invalid_argument(
                "platform",
                "stripe purchases are reconciled via webhooks",
            )),
        }
    }
}

fn map_verification_error(platform: Platform, err: VerificationError) -> EntitlementError {
    match err {
        VerificationError::MissingProof(field) => {
            EntitlementError::invalid_argument(field, "missing")
        }
        VerificationError::Rejected(reason) => {
            EntitlementError::verification_failed(platform, reason)
        }
        VerificationError::Http(reason) | VerificationError::InvalidResponse(reason) => {
            EntitlementError::infrastructure(reason)
        }
    }
}
