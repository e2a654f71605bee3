//! Schema-validated decoding of settlement event payloads.
//!
//! Loose JSON from the remote log is turned into a closed set of typed
//! variants before any business logic runs. Unrecognized types, schema
//! drift and malformed bodies are distinct error kinds, never a crash.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use capstream_core::{ClaimId, Currency, PayoutRail, PoolId};

use crate::record::{EventRecord, SCHEMA_VERSION, event_types};

/// Payload decoding error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unexpected event type: {0}")]
    UnexpectedType(String),

    #[error("unsupported schema version {found} for {event_type}")]
    UnsupportedSchema { event_type: String, found: u32 },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Payload of `CLAIM_PAYOUT_AUTHORIZED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayoutAuthorized {
    pub claim_id: ClaimId,
    pub policy_id: String,
    /// The liquidity pool backing this claim.
    pub pool_id: PoolId,
    pub amount_micros: i64,
    pub currency: Currency,
    pub recipient: String,
    pub rail: PayoutRail,
}

/// Payload of `CAPITAL_PAYOUT_EXECUTED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalPayoutExecuted {
    pub claim_id: ClaimId,
    pub amount_micros: i64,
    pub currency: Currency,
    /// Deterministic reference derived from the claim and its
    /// authorizing event; doubles as a double-payment guard.
    pub transaction_ref: String,
    /// The rail's own reference for the transfer, when it reports one.
    pub rail_reference: Option<String>,
    pub authorizing_event_id: String,
}

/// Payload of `CAPITAL_PAYOUT_FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalPayoutFailed {
    pub claim_id: ClaimId,
    pub amount_micros: i64,
    pub currency: Currency,
    pub failure_code: String,
    pub failure_reason: String,
    pub authorizing_event_id: String,
}

/// The closed set of settlement events this system understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    Authorized(ClaimPayoutAuthorized),
    Executed(CapitalPayoutExecuted),
    Failed(CapitalPayoutFailed),
}

fn check_schema(record: &EventRecord) -> Result<(), PayloadError> {
    if record.schema_version != SCHEMA_VERSION {
        return Err(PayloadError::UnsupportedSchema {
            event_type: record.event_type.clone(),
            found: record.schema_version,
        });
    }
    Ok(())
}

/// Decode any settlement event into the closed typed set.
pub fn decode_settlement_event(record: &EventRecord) -> Result<SettlementEvent, PayloadError> {
    check_schema(record)?;

    match record.event_type.as_str() {
        event_types::CLAIM_PAYOUT_AUTHORIZED => serde_json::from_value(record.payload.clone())
            .map(SettlementEvent::Authorized)
            .map_err(|e| PayloadError::Malformed(e.to_string())),
        event_types::CAPITAL_PAYOUT_EXECUTED => serde_json::from_value(record.payload.clone())
            .map(SettlementEvent::Executed)
            .map_err(|e| PayloadError::Malformed(e.to_string())),
        event_types::CAPITAL_PAYOUT_FAILED => serde_json::from_value(record.payload.clone())
            .map(SettlementEvent::Failed)
            .map_err(|e| PayloadError::Malformed(e.to_string())),
        other => Err(PayloadError::UnexpectedType(other.to_string())),
    }
}

/// Decode an authorization event specifically.
pub fn decode_authorization(record: &EventRecord) -> Result<ClaimPayoutAuthorized, PayloadError> {
    match decode_settlement_event(record)? {
        SettlementEvent::Authorized(payload) => Ok(payload),
        _ => Err(PayloadError::UnexpectedType(record.event_type.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(event_type: &str, schema_version: u32, payload: serde_json::Value) -> EventRecord {
        EventRecord {
            event_id: "auth_event_abc123".to_string(),
            sequence: 1,
            event_type: event_type.to_string(),
            schema_version,
            correlation_id: "claim_7".to_string(),
            idempotency_key: "k1".to_string(),
            occurred_at: Utc::now(),
            producer: "claims-decisions".to_string(),
            subject: "claim_7".to_string(),
            payload,
        }
    }

    fn authorization_payload() -> serde_json::Value {
        json!({
            "claim_id": "claim_7",
            "policy_id": "pol_123",
            "pool_id": "pool_x",
            "amount_micros": 5_000_000,
            "currency": "USD",
            "recipient": "acct_9f31",
            "rail": "bank_transfer",
        })
    }

    #[test]
    fn decodes_well_formed_authorization() {
        let record = record(
            event_types::CLAIM_PAYOUT_AUTHORIZED,
            SCHEMA_VERSION,
            authorization_payload(),
        );
        let decoded = decode_authorization(&record).unwrap();
        assert_eq!(decoded.claim_id.as_str(), "claim_7");
        assert_eq!(decoded.pool_id.as_str(), "pool_x");
        assert_eq!(decoded.amount_micros, 5_000_000);
        assert_eq!(decoded.rail, PayoutRail::BankTransfer);
    }

    #[test]
    fn missing_field_is_malformed_not_a_crash() {
        let mut payload = authorization_payload();
        payload.as_object_mut().unwrap().remove("amount_micros");
        let record = record(event_types::CLAIM_PAYOUT_AUTHORIZED, SCHEMA_VERSION, payload);

        assert!(matches!(
            decode_authorization(&record),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn invalid_pool_id_is_malformed() {
        let mut payload = authorization_payload();
        payload["pool_id"] = json!("not-a-pool");
        let record = record(event_types::CLAIM_PAYOUT_AUTHORIZED, SCHEMA_VERSION, payload);

        assert!(matches!(
            decode_authorization(&record),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_type_and_schema_are_distinct_errors() {
        let unknown = record("SOMETHING_ELSE", SCHEMA_VERSION, json!({}));
        assert!(matches!(
            decode_settlement_event(&unknown),
            Err(PayloadError::UnexpectedType(_))
        ));

        let drifted = record(event_types::CLAIM_PAYOUT_AUTHORIZED, 9, authorization_payload());
        assert!(matches!(
            decode_settlement_event(&drifted),
            Err(PayloadError::UnsupportedSchema { found: 9, .. })
        ));
    }

    #[test]
    fn consequence_payloads_round_trip() {
        let executed = CapitalPayoutExecuted {
            claim_id: ClaimId::new("claim_7").unwrap(),
            amount_micros: 5_000_000,
            currency: Currency::Usd,
            transaction_ref: "txn_claim_7_auth_eve".to_string(),
            rail_reference: Some("wire_0042".to_string()),
            authorizing_event_id: "auth_event_abc123".to_string(),
        };
        let record = record(
            event_types::CAPITAL_PAYOUT_EXECUTED,
            SCHEMA_VERSION,
            serde_json::to_value(&executed).unwrap(),
        );

        let SettlementEvent::Executed(decoded) = decode_settlement_event(&record).unwrap() else {
            panic!("expected executed variant");
        };
        assert_eq!(decoded, executed);
    }
}
