//! Quill Entitlements - subscription reconciliation backend for the Quill chat apps.
//!
//! Derives a single authoritative premium-access answer per user from three
//! eventually-consistent payment platforms (Apple App Store, Google Play,
//! Stripe), and maintains a deletion-resistant trial-abuse ledger.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
