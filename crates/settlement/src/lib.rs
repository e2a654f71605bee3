//! Settlement reconciliation: turns payout authorizations observed on
//! the remote ledger service into exactly-once payout executions.
//!
//! The worker is a single logical consumer of the remote log. Delivery
//! is at-least-once, so every externally visible write is gated
//! (query-before-write) and keyed deterministically so a second attempt
//! collapses into the first.

pub mod executor;
pub mod payout;
pub mod worker;


pub use executor::{PayoutExecutor, PayoutFailure, PayoutReceipt, PayoutRequest};
pub use payout::{PayoutStateError, PayoutStatus, PayoutTransaction};
pub use worker::{
    ClaimOutcome, CycleReport, SettlementError, SettlementWorker, WorkerConfig, WorkerHandle,
    transaction_ref,
};
