use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Current payload schema version for events this system produces.
pub const SCHEMA_VERSION: u32 = 1;

/// Event type names on the remote log that this system reads or writes.
pub mod event_types {
    /// Read: an external claims decision authorized a payout.
    pub const CLAIM_PAYOUT_AUTHORIZED: &str = "CLAIM_PAYOUT_AUTHORIZED";
    /// Written: a payout executed successfully.
    pub const CAPITAL_PAYOUT_EXECUTED: &str = "CAPITAL_PAYOUT_EXECUTED";
    /// Written: a payout failed terminally.
    pub const CAPITAL_PAYOUT_FAILED: &str = "CAPITAL_PAYOUT_FAILED";

    /// Is this a terminal consequence event for a claim?
    pub fn is_consequence(event_type: &str) -> bool {
        event_type == CAPITAL_PAYOUT_EXECUTED || event_type == CAPITAL_PAYOUT_FAILED
    }
}

/// An event as stored on the remote log.
///
/// `event_id` is the producer-assigned id in the remote service's own
/// opaque format (e.g. `auth_event_abc123`). `sequence` is the log's
/// total order; it is assigned by the service on append and is the
/// polling cursor's unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub sequence: u64,
    pub event_type: String,
    pub schema_version: u32,
    pub correlation_id: String,
    pub idempotency_key: String,
    pub occurred_at: DateTime<Utc>,
    pub producer: String,
    pub subject: String,
    pub payload: JsonValue,
}

/// An event ready to append (no sequence yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEventRecord {
    /// Producer-assigned event id; unique across the log.
    pub event_id: String,
    pub event_type: String,
    pub schema_version: u32,
    pub correlation_id: String,
    /// Appending the same key twice returns the original record.
    pub idempotency_key: String,
    pub occurred_at: DateTime<Utc>,
    pub producer: String,
    pub subject: String,
    pub payload: JsonValue,
}
