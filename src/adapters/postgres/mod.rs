//! PostgreSQL implementations of the persistence ports.
//!
//! The external document store realized as Postgres rows: one profile
//! row per user (entitlement fields plus the mirrored top-level status),
//! one write-once trial ledger row per identity. All writes are
//! single-statement and atomic per row; nothing spans the two tables
//! transactionally.

mod entitlement_store;
mod trial_ledger_store;

pub use entitlement_store::PostgresEntitlementStore;
pub use trial_ledger_store::PostgresTrialLedgerStore;
