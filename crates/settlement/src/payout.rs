//! Payout transaction state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use capstream_core::{ClaimId, Currency, PayoutRail, PoolId, TransactionId};
use capstream_eventlog::ClaimPayoutAuthorized;

/// Status of a payout. Transitions are monotonic and guarded; `Cleared`,
/// `Failed` and `ManualReview` are terminal inside the settlement core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Authorization observed, not yet executed.
    Pending,
    /// Liquidity reserved against the claim's pool.
    Locked,
    /// Execution in flight at the rail.
    Processing,
    /// Above the approval threshold; parked for an operator.
    ManualReview,
    /// Executed and recorded; terminal.
    Cleared,
    /// Terminal failure; requires a new corrective authorization.
    Failed,
}

impl PayoutStatus {
    fn can_transition(self, to: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, to),
            (Pending, Locked)
                | (Pending, ManualReview)
                | (Pending, Failed)
                | (Locked, Processing)
                | (Locked, Failed)
                | (Processing, Cleared)
                | (Processing, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal payout transition: {from:?} -> {to:?}")]
pub struct PayoutStateError {
    pub from: PayoutStatus,
    pub to: PayoutStatus,
}

/// Cross-service correlation object for one authorized payout.
///
/// Ephemeral: the worker materializes it per authorization; financial
/// truth stays in the ledger and treasury stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutTransaction {
    pub claim_id: ClaimId,
    pub policy_id: String,
    pub pool_id: PoolId,
    pub recipient: String,
    pub amount_micros: i64,
    pub currency: Currency,
    pub rail: PayoutRail,
    pub status: PayoutStatus,
    pub idempotency_key: String,
    /// The local ledger transaction posted on success.
    pub ledger_transaction_id: Option<TransactionId>,
    pub authorizing_event_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayoutTransaction {
    pub fn from_authorization(
        authorization: &ClaimPayoutAuthorized,
        authorizing_event_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            claim_id: authorization.claim_id.clone(),
            policy_id: authorization.policy_id.clone(),
            pool_id: authorization.pool_id.clone(),
            recipient: authorization.recipient.clone(),
            amount_micros: authorization.amount_micros,
            currency: authorization.currency,
            rail: authorization.rail,
            status: PayoutStatus::Pending,
            idempotency_key: format!("payout:{}", authorization.claim_id),
            ledger_transaction_id: None,
            authorizing_event_id: authorizing_event_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the state machine; illegal transitions are rejected.
    pub fn transition(&mut self, to: PayoutStatus) -> Result<(), PayoutStateError> {
        if !self.status.can_transition(to) {
            return Err(PayoutStateError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            PayoutStatus::Cleared | PayoutStatus::Failed | PayoutStatus::ManualReview
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization() -> ClaimPayoutAuthorized {
        ClaimPayoutAuthorized {
            claim_id: ClaimId::new("claim_7").unwrap(),
            policy_id: "pol_123".to_string(),
            pool_id: PoolId::new("pool_x").unwrap(),
            amount_micros: 5_000_000,
            currency: Currency::Usd,
            recipient: "acct_9f31".to_string(),
            rail: PayoutRail::BankTransfer,
        }
    }

    #[test]
    fn happy_path_reaches_cleared() {
        let mut payout =
            PayoutTransaction::from_authorization(&authorization(), "auth_event_abc123");
        assert_eq!(payout.status, PayoutStatus::Pending);

        payout.transition(PayoutStatus::Locked).unwrap();
        payout.transition(PayoutStatus::Processing).unwrap();
        payout.transition(PayoutStatus::Cleared).unwrap();
        assert!(payout.is_terminal());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut payout =
            PayoutTransaction::from_authorization(&authorization(), "auth_event_abc123");
        payout.transition(PayoutStatus::Locked).unwrap();
        payout.transition(PayoutStatus::Failed).unwrap();

        let err = payout.transition(PayoutStatus::Processing).unwrap_err();
        assert_eq!(err.from, PayoutStatus::Failed);
    }

    #[test]
    fn cannot_clear_without_processing() {
        let mut payout =
            PayoutTransaction::from_authorization(&authorization(), "auth_event_abc123");
        assert!(payout.transition(PayoutStatus::Cleared).is_err());
    }

    #[test]
    fn manual_review_branches_from_pending() {
        let mut payout =
            PayoutTransaction::from_authorization(&authorization(), "auth_event_abc123");
        payout.transition(PayoutStatus::ManualReview).unwrap();
        assert!(payout.is_terminal());
    }
}
