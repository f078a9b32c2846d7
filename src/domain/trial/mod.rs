//! Trial-abuse prevention domain types.
//!
//! The trial ledger is the one record designed to outlive account
//! deletion: a write-once entry per identity that has ever started a
//! free trial, keyed by user id and a salted hash of the email.

mod email_hash;
mod ledger;

pub use email_hash::EmailHash;
pub use ledger::{TrialHistory, TrialLedgerEntry};
