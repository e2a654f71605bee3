//! Double-entry ledger: append-only store and accounting engine.
//!
//! Money movement is recorded as balanced transactions (signed micro-unit
//! entries summing to zero). Balances are derived sums, recomputed on
//! read; the entry log is the source of truth.

pub mod engine;
pub mod model;
pub mod store;

pub use engine::{LedgerEngine, LedgerError};
pub use model::{
    AccountBalance, LedgerEntry, LedgerTransaction, NewEntry, NewTransaction, ReferenceType,
};
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerStoreError};
