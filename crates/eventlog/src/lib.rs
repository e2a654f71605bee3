//! Client boundary for the external ledger event service.
//!
//! The remote log is the system of record for payout authorization: an
//! append-only, totally ordered stream queryable by event type, cursor
//! and subject. This crate models the record envelope, the client trait
//! (with an in-memory implementation for tests/dev), and schema-validated
//! decoding of the payloads this system reads and writes.

pub mod api;
pub mod in_memory;
pub mod payloads;
pub mod record;

pub use api::{EventLogApi, EventLogError};
pub use in_memory::InMemoryEventLog;
pub use payloads::{
    CapitalPayoutExecuted, CapitalPayoutFailed, ClaimPayoutAuthorized, PayloadError,
    SettlementEvent, decode_authorization, decode_settlement_event,
};
pub use record::{EventRecord, NewEventRecord, SCHEMA_VERSION, event_types};
