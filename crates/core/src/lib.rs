//! `capstream-core` — shared settlement-domain primitives.
//!
//! This crate contains **pure domain** building blocks (no infrastructure
//! concerns): micro-unit money, the fixed account taxonomy, and the
//! identifier newtypes used across the ledger, treasury and settlement
//! crates.

pub mod account;
pub mod error;
pub mod id;
pub mod money;
pub mod rail;

pub use account::{AccountKind, CoreAccount, LedgerAccount};
pub use error::{DomainError, DomainResult};
pub use id::{AlertId, ClaimId, EntryId, LockId, PoolId, TransactionId};
pub use money::{Currency, MICROS_PER_UNIT, micros_from_display, micros_to_display_string};
pub use rail::PayoutRail;
