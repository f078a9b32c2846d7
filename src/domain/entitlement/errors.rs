//! Entitlement-specific error types.
//!
//! The client-facing failure taxonomy for reconciliation operations.
//!
//! # Category Mapping
//!
//! | Error | Category | HTTP Status |
//! |-------|----------|-------------|
//! | Unauthenticated | unauthenticated | 401 |
//! | InvalidArgument | invalid-argument | 400 |
//! | TrialAlreadyUsed | failed-precondition | 412 |
//! | VerificationFailed | failed-precondition | 412 |
//! | UserNotFound | not-found | 404 |
//! | Infrastructure | internal | 500 |

use crate::domain::foundation::{DomainError, ErrorCode};

use super::Platform;

/// Machine-readable failure category, as returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Unauthenticated,
    InvalidArgument,
    FailedPrecondition,
    NotFound,
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Unauthenticated => "unauthenticated",
            FailureCategory::InvalidArgument => "invalid-argument",
            FailureCategory::FailedPrecondition => "failed-precondition",
            FailureCategory::NotFound => "not-found",
            FailureCategory::Internal => "internal",
        }
    }
}

/// Errors surfaced by entitlement reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementError {
    /// Caller identity missing or invalid.
    Unauthenticated,

    /// Caller input rejected before any external call.
    InvalidArgument { field: String, message: String },

    /// Trial already consumed by a different identity. Never silently
    /// downgraded; the caller must see this failure explicitly.
    TrialAlreadyUsed,

    /// No user could be resolved for the operation's target.
    UserNotFound(String),

    /// The payment platform rejected the receipt/token.
    VerificationFailed { platform: Platform, reason: String },

    /// Persistence or outbound-call failure.
    Infrastructure(String),
}

impl EntitlementError {
    pub fn unauthenticated() -> Self {
        EntitlementError::Unauthenticated
    }

    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        EntitlementError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn trial_already_used() -> Self {
        EntitlementError::TrialAlreadyUsed
    }

    pub fn user_not_found(target: impl Into<String>) -> Self {
        EntitlementError::UserNotFound(target.into())
    }

    pub fn verification_failed(platform: Platform, reason: impl Into<String>) -> Self {
        EntitlementError::VerificationFailed {
            platform,
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        EntitlementError::Infrastructure(message.into())
    }

    /// Returns the machine-readable category for this error.
    pub fn category(&self) -> FailureCategory {
        match self {
            EntitlementError::Unauthenticated => FailureCategory::Unauthenticated,
            EntitlementError::InvalidArgument { .. } => FailureCategory::InvalidArgument,
            EntitlementError::TrialAlreadyUsed | EntitlementError::VerificationFailed { .. } => {
                FailureCategory::FailedPrecondition
            }
            EntitlementError::UserNotFound(_) => FailureCategory::NotFound,
            EntitlementError::Infrastructure(_) => FailureCategory::Internal,
        }
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EntitlementError::Unauthenticated => ErrorCode::Unauthorized,
            EntitlementError::InvalidArgument { .. } => ErrorCode::ValidationFailed,
            EntitlementError::TrialAlreadyUsed => ErrorCode::TrialAlreadyUsed,
            EntitlementError::UserNotFound(_) => ErrorCode::UserNotFound,
            EntitlementError::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            EntitlementError::Infrastructure(_) => ErrorCode::InternalError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            EntitlementError::Unauthenticated => "Authentication is required".to_string(),
            EntitlementError::InvalidArgument { field, message } => {
                format!("Invalid argument '{}': {}", field, message)
            }
            EntitlementError::TrialAlreadyUsed => {
                "Free trial already used by this identity".to_string()
            }
            EntitlementError::UserNotFound(target) => {
                format!("No user found for {}", target)
            }
            EntitlementError::VerificationFailed { platform, reason } => {
                format!("{} verification failed: {}", platform, reason)
            }
            EntitlementError::Infrastructure(message) => message.clone(),
        }
    }
}

impl std::fmt::Display for EntitlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category().as_str(), self.message())
    }
}

impl std::error::Error for EntitlementError {}

impl From<DomainError> for EntitlementError {
    fn from(err: DomainError) -> Self {
        EntitlementError::Infrastructure(err.to_string())
    }
}
