//! ProcessAppleNotificationHandler - platform-pushed Apple events.
//!
//! Apple retries notifications on non-2xx responses, which would cause
//! unbounded redelivery of a payload that will never resolve (an
//! unlinkable token, a broken signature). Every failure here is
//! therefore logged and acknowledged; this handler is infallible by
//! construction and the endpoint always answers 200.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementPatch, MembershipStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{AppleNotification, AppleNotificationVerifier, EntitlementStore};

/// Result of processing one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    /// The target user's entitlement was updated.
    Applied {
        user_id: UserId,
        status: MembershipStatus,
    },
    /// Nothing was changed; the reason was logged.
    Acknowledged { reason: String },
}

/// Handler for Apple App Store server notifications.
pub struct ProcessAppleNotificationHandler {
    verifier: Arc<dyn AppleNotificationVerifier>,
    store: Arc<dyn EntitlementStore>,
}

impl ProcessAppleNotificationHandler {
    pub fn new(
        verifier: Arc<dyn AppleNotificationVerifier>,
        store: Arc<dyn EntitlementStore>,
    ) -> Self {
        Self { verifier, store }
    }

    /// Verifies and applies one signed notification.
    ///
    /// Never returns an error: the caller acknowledges regardless, so
    /// failures are folded into [`NotificationOutcome::Acknowledged`].
    pub async fn handle(&self, signed_payload: &str) -> NotificationOutcome {
        let notification = match self.verifier.verify(signed_payload) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(error = %e, "apple notification failed verification");
                return NotificationOutcome::Acknowledged {
                    reason: format!("verification failed: {}", e),
                };
            }
        };

        self.apply(&notification).await
    }

    async fn apply(&self, notification: &AppleNotification) -> NotificationOutcome {
        let ack = |reason: String| {
            tracing::warn!(
                notification_type = %notification.notification_type,
                notification_uuid = %notification.notification_uuid,
                %reason,
                "apple notification acknowledged without changes"
            );
            NotificationOutcome::Acknowledged { reason }
        };

        let Some(status) = status_for(&notification.notification_type) else {
            return ack(format!(
                "unhandled notification type {}",
                notification.notification_type
            ));
        };

        let Some(transaction) = &notification.transaction else {
            return ack("notification carries no transaction payload".to_string());
        };

        let Some(token) = &transaction.app_account_token else {
            return ack("transaction has no app account token".to_string());
        };

        let Some(expires_date) = transaction.expires_date else {
            return ack("transaction has no expiry".to_string());
        };

        let user_id = match self.store.find_user_by_platform_account_token(token).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return ack("no user matches app account token".to_string()),
            Err(e) => return ack(format!("token lookup failed: {}", e)),
        };

        // Trial state refines the premium-side statuses only.
        let status = if status.is_premium() && transaction.in_trial {
            MembershipStatus::Trial
        } else {
            status
        };

        let now = Timestamp::now();
        let mut patch = EntitlementPatch::status_override(status, now);
        patch.expires_at = Some(Some(expires_date));
        if let Some(auto_renewing) = transaction.auto_renewing {
            patch.auto_renewing = Some(auto_renewing);
        }

        if let Err(e) = self.store.merge_entitlement(&user_id, &patch).await {
            return ack(format!("entitlement merge failed: {}", e));
        }

        tracing::info!(
            user_id = %user_id,
            notification_type = %notification.notification_type,
            %status,
            "apple notification applied"
        );

        NotificationOutcome::Applied { user_id, status }
    }
}

/// Maps a notification type to the status it forces, if any.
fn status_for(notification_type: &str) -> Option<MembershipStatus> {
    match notification_type {
        "SUBSCRIBED" | "DID_RENEW" | "DID_RECOVER" | "OFFER_REDEEMED"
        | "DID_CHANGE_RENEWAL_STATUS" | "DID_CHANGE_RENEWAL_PREF" => {
            Some(MembershipStatus::Premium)
        }
        "DID_FAIL_TO_RENEW" => Some(MembershipStatus::PastDue),
        "EXPIRED" | "GRACE_PERIOD_EXPIRED" | "REFUND" | "REVOKE" => {
            Some(MembershipStatus::Canceled)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::EntitlementRecord;
    use crate::domain::foundation::DomainError;
    use crate::ports::{AppleTransactionInfo, NotificationError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════

    struct MockNotificationVerifier {
        result: Result<AppleNotification, NotificationError>,
    }

    impl AppleNotificationVerifier for MockNotificationVerifier {
        fn verify(&self, _signed_payload: &str) -> Result<AppleNotification, NotificationError> {
            self.result.clone()
        }
    }

    struct MockEntitlementStore {
        records: Mutex<Vec<EntitlementRecord>>,
    }

    impl MockEntitlementStore {
        fn with_record(record: EntitlementRecord) -> Self {
            Self {
                records: Mutex::new(vec![record]),
            }
        }

        fn empty() -> Self {
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
            token: &str,
        ) -> Result<Option<UserId>, DomainError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.platform_account_token.as_deref() == Some(token))
                .map(|r| r.user_id.clone()))
        }

        async fn find_user_by_stripe_customer_id(
            &self,
            _customer_id: &str,
        ) -> Result<Option<UserId>, DomainError> {
            Ok(None)
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn linked_record() -> EntitlementRecord {
        let mut record = EntitlementRecord::demo(user());
        record.membership_status = MembershipStatus::Premium;
        record.is_premium = true;
        record.platform_account_token = Some("pat-123".to_string());
        record
    }

    fn renewal_notification() -> AppleNotification {
        AppleNotification {
            notification_type: "DID_RENEW".to_string(),
            subtype: None,
            notification_uuid: "uuid-1".to_string(),
            bundle_id: "com.quillchat.app".to_string(),
            environment: "Production".to_string(),
            transaction: Some(AppleTransactionInfo {
                product_id: "premium_monthly".to_string(),
                original_transaction_id: "orig-1".to_string(),
                expires_date: Some(Timestamp::from_unix_secs(4_102_444_800)),
                app_account_token: Some("pat-123".to_string()),
                in_trial: false,
                auto_renewing: Some(true),
            }),
        }
    }

    fn handler(
        result: Result<AppleNotification, NotificationError>,
        store: MockEntitlementStore,
    ) -> (ProcessAppleNotificationHandler, Arc<MockEntitlementStore>) {
        let store = Arc::new(store);
        let handler = ProcessAppleNotificationHandler::new(
            Arc::new(MockNotificationVerifier { result }),
            store.clone(),
        );
        (handler, store)
    }

    // ════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn renewal_updates_expiry_for_linked_user() {
        let (handler, store) = handler(
            Ok(renewal_notification()),
            MockEntitlementStore::with_record(linked_record()),
        );

        let outcome = handler.handle("signed-payload").await;

        assert_eq!(
            outcome,
            NotificationOutcome::Applied {
                user_id: user(),
                status: MembershipStatus::Premium,
            }
        );
        let record = store.get_entitlement(&user()).await.unwrap().unwrap();
        assert_eq!(
            record.expires_at.unwrap().as_unix_secs(),
            4_102_444_800
        );
        assert!(record.auto_renewing);
    }

    #[tokio::test]
    async fn expiry_notification_forces_canceled() {
        let mut notification = renewal_notification();
        notification.notification_type = "EXPIRED".to_string();

        let (handler, store) = handler(
            Ok(notification),
            MockEntitlementStore::with_record(linked_record()),
        );

        let outcome = handler.handle("signed-payload").await;

        assert!(matches!(
            outcome,
            NotificationOutcome::Applied {
                status: MembershipStatus::Canceled,
                ..
            }
        ));
        let record = store.get_entitlement(&user()).await.unwrap().unwrap();
        assert!(!record.is_premium);
    }

    #[tokio::test]
    async fn failed_renewal_forces_past_due() {
        let mut notification = renewal_notification();
        notification.notification_type = "DID_FAIL_TO_RENEW".to_string();

        let (handler, _store) = handler(
            Ok(notification),
            MockEntitlementStore::with_record(linked_record()),
        );

        let outcome = handler.handle("signed-payload").await;
        assert!(matches!(
            outcome,
            NotificationOutcome::Applied {
                status: MembershipStatus::PastDue,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn verification_failure_is_acknowledged_not_fatal() {
        let (handler, _store) = handler(
            Err(NotificationError::UntrustedChain("bad anchor".to_string())),
            MockEntitlementStore::with_record(linked_record()),
        );

        let outcome = handler.handle("signed-payload").await;
        assert!(matches!(outcome, NotificationOutcome::Acknowledged { .. }));
    }

    #[tokio::test]
    async fn unlinkable_token_is_acknowledged() {
        let (handler, _store) = handler(
            Ok(renewal_notification()),
            MockEntitlementStore::empty(), // nobody holds pat-123
        );

        let outcome = handler.handle("signed-payload").await;
        assert!(matches!(outcome, NotificationOutcome::Acknowledged { .. }));
    }

    #[tokio::test]
    async fn missing_expiry_is_acknowledged() {
        let mut notification = renewal_notification();
        notification.transaction.as_mut().unwrap().expires_date = None;

        let (handler, store) = handler(
            Ok(notification),
            MockEntitlementStore::with_record(linked_record()),
        );

        let outcome = handler.handle("signed-payload").await;
        assert!(matches!(outcome, NotificationOutcome::Acknowledged { .. }));
        // Untouched record.
        let record = store.get_entitlement(&user()).await.unwrap().unwrap();
        assert_eq!(record.expires_at, None);
    }

    #[tokio::test]
    async fn test_notification_type_is_acknowledged() {
        let mut notification = renewal_notification();
        notification.notification_type = "TEST".to_string();
        notification.transaction = None;

        let (handler, _store) = handler(
            Ok(notification),
            MockEntitlementStore::with_record(linked_record()),
        );

        let outcome = handler.handle("signed-payload").await;
        assert!(matches!(outcome, NotificationOutcome::Acknowledged { .. }));
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let (handler, store) = handler(
            Ok(renewal_notification()),
            MockEntitlementStore::with_record(linked_record()),
        );

        handler.handle("signed-payload").await;
        let first = store.get_entitlement(&user()).await.unwrap().unwrap();

        handler.handle("signed-payload").await;
        let second = store.get_entitlement(&user()).await.unwrap().unwrap();

        assert_eq!(first.membership_status, second.membership_status);
        assert_eq!(first.expires_at, second.expires_at);
        assert_eq!(first.auto_renewing, second.auto_renewing);
    }
}
