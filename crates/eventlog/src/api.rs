//! Remote event log client contract.

use std::sync::Arc;

use thiserror::Error;

use crate::record::{EventRecord, NewEventRecord};

/// Event log operation error.
#[derive(Debug, Clone, Error)]
pub enum EventLogError {
    /// The service could not be reached or failed mid-call. Callers
    /// abort the current cycle and retry on the next one.
    #[error("event log unavailable: {0}")]
    Unavailable(String),

    /// The record was rejected before it was stored.
    #[error("invalid event record: {0}")]
    InvalidRecord(String),
}

/// Append-only, totally ordered event log.
///
/// The remote service is the single source of truth for authorization;
/// this system is a downstream consumer. Delivery is at-least-once:
/// consumers must gate on prior consequence events, and `append` must be
/// idempotent by `idempotency_key` so redelivered writes collapse.
pub trait EventLogApi: Send + Sync {
    /// Append one event. If a record with the same `idempotency_key`
    /// already exists, the original is returned and nothing is written.
    fn append(&self, record: NewEventRecord) -> Result<EventRecord, EventLogError>;

    /// Events of one type with `sequence` strictly greater than
    /// `cursor`, in log order, at most `limit`.
    fn events_after(
        &self,
        cursor: u64,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError>;

    /// All events for a subject (e.g. a claim id), in log order.
    fn events_for_subject(&self, subject: &str) -> Result<Vec<EventRecord>, EventLogError>;
}

impl<L> EventLogApi for Arc<L>
where
    L: EventLogApi + ?Sized,
{
    fn append(&self, record: NewEventRecord) -> Result<EventRecord, EventLogError> {
        (**self).append(record)
    }

    fn events_after(
        &self,
        cursor: u64,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        (**self).events_after(cursor, event_type, limit)
    }

    fn events_for_subject(&self, subject: &str) -> Result<Vec<EventRecord>, EventLogError> {
        (**self).events_for_subject(subject)
    }
}
