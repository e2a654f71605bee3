//! In-memory event log for tests/dev.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::api::{EventLogApi, EventLogError};
use crate::record::{EventRecord, NewEventRecord};

#[derive(Debug, Default)]
struct LogState {
    records: Vec<EventRecord>,
    /// idempotency_key → index into `records`.
    by_key: HashMap<String, usize>,
    event_ids: HashSet<String>,
}

/// In-memory append-only event log.
///
/// Sequence numbers start at 1 and are assigned in append order.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    state: RwLock<LogState>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Total number of records on the log.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventLogApi for InMemoryEventLog {
    fn append(&self, record: NewEventRecord) -> Result<EventRecord, EventLogError> {
        if record.event_id.is_empty() {
            return Err(EventLogError::InvalidRecord(
                "event_id must not be empty".to_string(),
            ));
        }
        if record.event_type.is_empty() {
            return Err(EventLogError::InvalidRecord(
                "event_type must not be empty".to_string(),
            ));
        }
        if record.idempotency_key.is_empty() {
            return Err(EventLogError::InvalidRecord(
                "idempotency_key must not be empty".to_string(),
            ));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        if let Some(&idx) = state.by_key.get(&record.idempotency_key) {
            return Ok(state.records[idx].clone());
        }

        if state.event_ids.contains(&record.event_id) {
            return Err(EventLogError::InvalidRecord(format!(
                "event id already used: {}",
                record.event_id
            )));
        }

        let stored = EventRecord {
            event_id: record.event_id.clone(),
            sequence: state.records.len() as u64 + 1,
            event_type: record.event_type,
            schema_version: record.schema_version,
            correlation_id: record.correlation_id,
            idempotency_key: record.idempotency_key.clone(),
            occurred_at: record.occurred_at,
            producer: record.producer,
            subject: record.subject,
            payload: record.payload,
        };

        let idx = state.records.len();
        state.by_key.insert(record.idempotency_key, idx);
        state.event_ids.insert(record.event_id);
        state.records.push(stored.clone());
        Ok(stored)
    }

    fn events_after(
        &self,
        cursor: u64,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        let state = self
            .state
            .read()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        Ok(state
            .records
            .iter()
            .filter(|r| r.sequence > cursor && r.event_type == event_type)
            .take(limit)
            .cloned()
            .collect())
    }

    fn events_for_subject(&self, subject: &str) -> Result<Vec<EventRecord>, EventLogError> {
        let state = self
            .state
            .read()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        Ok(state
            .records
            .iter()
            .filter(|r| r.subject == subject)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::record::{SCHEMA_VERSION, event_types};

    fn authorization(subject: &str, key: &str) -> NewEventRecord {
        NewEventRecord {
            event_id: format!("auth_event_{key}"),
            event_type: event_types::CLAIM_PAYOUT_AUTHORIZED.to_string(),
            schema_version: SCHEMA_VERSION,
            correlation_id: subject.to_string(),
            idempotency_key: key.to_string(),
            occurred_at: Utc::now(),
            producer: "claims-decisions".to_string(),
            subject: subject.to_string(),
            payload: json!({}),
        }
    }

    #[test]
    fn append_assigns_monotonic_sequences() {
        let log = InMemoryEventLog::new();
        let a = log.append(authorization("claim_1", "k1")).unwrap();
        let b = log.append(authorization("claim_2", "k2")).unwrap();
        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
    }

    #[test]
    fn append_is_idempotent_by_key() {
        let log = InMemoryEventLog::new();
        let first = log.append(authorization("claim_1", "k1")).unwrap();
        let second = log.append(authorization("claim_1", "k1")).unwrap();
        assert_eq!(first, second);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn events_after_filters_by_cursor_and_type() {
        let log = InMemoryEventLog::new();
        log.append(authorization("claim_1", "k1")).unwrap();
        let mut other = authorization("claim_1", "k2");
        other.event_type = event_types::CAPITAL_PAYOUT_EXECUTED.to_string();
        log.append(other).unwrap();
        log.append(authorization("claim_2", "k3")).unwrap();

        let events = log
            .events_after(1, event_types::CLAIM_PAYOUT_AUTHORIZED, 10)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, "claim_2");

        let by_subject = log.events_for_subject("claim_1").unwrap();
        assert_eq!(by_subject.len(), 2);
    }

    #[test]
    fn empty_key_is_rejected() {
        let log = InMemoryEventLog::new();
        let mut record = authorization("claim_1", "k1");
        record.idempotency_key.clear();
        assert!(matches!(
            log.append(record),
            Err(EventLogError::InvalidRecord(_))
        ));
    }
}
