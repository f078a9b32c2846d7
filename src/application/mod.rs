//! Application layer: command handlers orchestrating verify -> derive ->
//! persist, plus the trial ledger service.

pub mod handlers;
mod trial_ledger;

pub use trial_ledger::TrialLedgerService;
