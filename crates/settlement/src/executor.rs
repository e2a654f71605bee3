//! Payout execution boundary.
//!
//! The process that actually moves money (bank transfer, card network,
//! stablecoin rail) lives behind this trait: opaque, possibly slow,
//! possibly failing. It must not be invoked again for a claim once a
//! terminal consequence exists; rails that support a client reference
//! can additionally dedupe on the deterministic transaction reference
//! derived from `(claim_id, authorizing_event_id)`.

use std::sync::Arc;

use thiserror::Error;

use capstream_core::{ClaimId, Currency, PayoutRail};

/// A request to move money for one authorized claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRequest {
    pub claim_id: ClaimId,
    pub amount_micros: i64,
    pub currency: Currency,
    pub recipient: String,
    pub rail: PayoutRail,
    pub authorizing_event_id: String,
}

/// Successful execution report from the rail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutReceipt {
    /// The rail's own reference for the transfer, when it reports one.
    pub rail_reference: Option<String>,
}

/// Terminal execution failure reported by the rail.
///
/// Any failure here is permanent from the settlement core's point of
/// view: it becomes a `CAPITAL_PAYOUT_FAILED` consequence and is never
/// retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("payout failed ({code}): {reason}")]
pub struct PayoutFailure {
    pub code: String,
    pub reason: String,
}

/// External collaborator that executes payouts.
pub trait PayoutExecutor: Send + Sync {
    fn execute(&self, request: &PayoutRequest) -> Result<PayoutReceipt, PayoutFailure>;
}

impl<X> PayoutExecutor for Arc<X>
where
    X: PayoutExecutor + ?Sized,
{
    fn execute(&self, request: &PayoutRequest) -> Result<PayoutReceipt, PayoutFailure> {
        (**self).execute(request)
    }
}
