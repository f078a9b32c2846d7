//! Membership status state machine.
//!
//! Platform-agnostic subscription lifecycle. `canceled`, `past_due`, and
//! `demo` all collapse to "no live access" at the API boundary but stay
//! distinct for support and analytics.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Membership subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// No validated purchase. Default state for every account.
    Demo,

    /// Free trial in progress. Full premium access.
    Trial,

    /// Paid (or lifetime) access.
    Premium,

    /// Subscription ended or was revoked. No access until a new
    /// validated purchase restarts the cycle.
    Canceled,

    /// Payment failed, platform is retrying. No access, recoverable.
    PastDue,
}

impl MembershipStatus {
    /// Returns true if this status grants premium access.
    ///
    /// Both trial and paid count as premium access.
    pub fn is_premium(&self) -> bool {
        matches!(self, MembershipStatus::Trial | MembershipStatus::Premium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Demo => "demo",
            MembershipStatus::Trial => "trial",
            MembershipStatus::Premium => "premium",
            MembershipStatus::Canceled => "canceled",
            MembershipStatus::PastDue => "past_due",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "demo" => Some(MembershipStatus::Demo),
            "trial" => Some(MembershipStatus::Trial),
            "premium" => Some(MembershipStatus::Premium),
            "canceled" => Some(MembershipStatus::Canceled),
            "past_due" => Some(MembershipStatus::PastDue),
            _ => None,
        }
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StateMachine for MembershipStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use MembershipStatus::*;
        matches!(
            (self, target),
            // From DEMO
            (Demo, Trial)
                | (Demo, Premium)
            // From TRIAL
                | (Trial, Trial) // Revalidation
                | (Trial, Premium) // Conversion
                | (Trial, Canceled)
            // From PREMIUM
                | (Premium, Premium) // Renewal
                | (Premium, PastDue)
                | (Premium, Canceled)
            // From PAST_DUE
                | (PastDue, Premium) // Payment recovered
                | (PastDue, PastDue)
                | (PastDue, Canceled)
            // From CANCELED: a new validated purchase restarts the cycle
                | (Canceled, Trial)
                | (Canceled, Premium)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use MembershipStatus::*;
        match self {
            Demo => vec![Trial, Premium],
            Trial => vec![Trial, Premium, Canceled],
            Premium => vec![Premium, PastDue, Canceled],
            PastDue => vec![Premium, PastDue, Canceled],
            Canceled => vec![Trial, Premium],
        }
    }
}
