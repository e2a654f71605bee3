//! Settlement reconciliation worker.
//!
//! A single cooperative polling loop over the remote log's
//! `CLAIM_PAYOUT_AUTHORIZED` stream. The cursor advances only after an
//! event is fully handled (executed, failed, skipped as duplicate,
//! parked for review, or logged as invalid), so observation is
//! at-least-once and never less-than-once. Transient infrastructure
//! errors abort the cycle with the cursor unchanged and are retried on
//! the next one.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use capstream_core::{ClaimId, CoreAccount, TransactionId};
use capstream_eventlog::{
    CapitalPayoutExecuted, CapitalPayoutFailed, ClaimPayoutAuthorized, EventLogApi, EventLogError,
    EventRecord, NewEventRecord, SCHEMA_VERSION, decode_authorization, event_types,
};
use capstream_ledger::{
    LedgerEngine, LedgerError, LedgerStore, NewEntry, NewTransaction, ReferenceType,
};
use capstream_treasury::{TreasuryEngine, TreasuryError, TreasuryStore};

use crate::executor::{PayoutExecutor, PayoutRequest};
use crate::payout::{PayoutStateError, PayoutStatus, PayoutTransaction};

/// Settlement worker error. Everything here is transient from the
/// loop's point of view: the cycle aborts and the same events are
/// re-observed next time.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    EventLog(#[from] EventLogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Treasury(#[from] TreasuryError),

    #[error(transparent)]
    State(#[from] PayoutStateError),

    #[error("payload encoding failed: {0}")]
    Encode(String),
}

/// Deterministic transaction reference for a successful execution:
/// `txn_<claim_id>_<first 8 chars of authorizing event id>`.
///
/// Repeated executions for the same authorization produce the same
/// reference, which doubles as a double-payment guard at the rail.
pub fn transaction_ref(claim_id: &ClaimId, authorizing_event_id: &str) -> String {
    let prefix: String = authorizing_event_id.chars().take(8).collect();
    format!("txn_{claim_id}_{prefix}")
}

fn consequence_key(event_type: &str, claim_id: &ClaimId) -> String {
    format!("{event_type}:{claim_id}")
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Max authorization events fetched per cycle.
    pub batch_limit: usize,
    /// Producer name stamped on consequence events.
    pub producer: String,
    /// TTL for fund locks taken by the worker.
    pub lock_ttl: chrono::Duration,
    /// Amounts above this branch to manual review instead of executing.
    pub approval_threshold_micros: i64,
    /// Name for logging.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_limit: 50,
            producer: "capstream-settlement".to_string(),
            lock_ttl: chrono::Duration::hours(24),
            approval_threshold_micros: 10_000_000_000,
            name: "settlement-worker".to_string(),
        }
    }
}

/// How one authorization event was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Executed,
    Failed,
    SkippedDuplicate,
    ManualReview,
    Invalid,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub executed: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
    pub manual_review: usize,
    pub invalid: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: ClaimOutcome) {
        match outcome {
            ClaimOutcome::Executed => self.executed += 1,
            ClaimOutcome::Failed => self.failed += 1,
            ClaimOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            ClaimOutcome::ManualReview => self.manual_review += 1,
            ClaimOutcome::Invalid => self.invalid += 1,
        }
    }
}

/// Handle to control and join the worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    /// An in-flight cycle runs to completion first; there is no
    /// mid-cycle cancellation.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// The reconciliation worker.
///
/// Owns only its polling cursor; all financial truth lives in the
/// ledger and treasury stores and on the remote log.
pub struct SettlementWorker<L, X, LS, TS>
where
    L: EventLogApi,
    X: PayoutExecutor,
    LS: LedgerStore,
    TS: TreasuryStore,
{
    remote: L,
    executor: X,
    ledger: Arc<LedgerEngine<LS>>,
    treasury: Arc<TreasuryEngine<TS>>,
    config: WorkerConfig,
    cursor: u64,
}

impl<L, X, LS, TS> SettlementWorker<L, X, LS, TS>
where
    L: EventLogApi,
    X: PayoutExecutor,
    LS: LedgerStore,
    TS: TreasuryStore,
{
    pub fn new(
        remote: L,
        executor: X,
        ledger: Arc<LedgerEngine<LS>>,
        treasury: Arc<TreasuryEngine<TS>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            remote,
            executor,
            ledger,
            treasury,
            config,
            cursor: 0,
        }
    }

    /// Last fully-handled remote sequence.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Run one poll cycle synchronously.
    ///
    /// Public so compositions and tests can drive the worker without a
    /// background thread.
    pub fn run_cycle(&mut self) -> Result<CycleReport, SettlementError> {
        let events = self.remote.events_after(
            self.cursor,
            event_types::CLAIM_PAYOUT_AUTHORIZED,
            self.config.batch_limit,
        )?;

        let mut report = CycleReport {
            fetched: events.len(),
            ..CycleReport::default()
        };

        for record in events {
            let outcome = self.handle_authorization(&record)?;
            report.record(outcome);
            // Only a fully-handled event moves the cursor.
            self.cursor = record.sequence;
        }

        Ok(report)
    }

    fn handle_authorization(
        &self,
        record: &EventRecord,
    ) -> Result<ClaimOutcome, SettlementError> {
        let authorization = match decode_authorization(record) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    sequence = record.sequence,
                    event_id = %record.event_id,
                    error = %err,
                    "discarding malformed authorization payload"
                );
                return Ok(ClaimOutcome::Invalid);
            }
        };
        let claim_id = authorization.claim_id.clone();

        // Idempotency gate: a prior consequence on the remote log wins.
        let prior = self.remote.events_for_subject(claim_id.as_str())?;
        let has_executed = prior
            .iter()
            .any(|r| r.event_type == event_types::CAPITAL_PAYOUT_EXECUTED);
        if has_executed
            || prior
                .iter()
                .any(|r| r.event_type == event_types::CAPITAL_PAYOUT_FAILED)
        {
            if has_executed {
                // A crash may have dropped the lock release; repair it.
                // After a FAILED consequence the lock stays put so the
                // expiry sweep returns the capital.
                self.release_active_lock(&claim_id)?;
            }
            debug!(claim_id = %claim_id, "consequence already recorded; skipping");
            return Ok(ClaimOutcome::SkippedDuplicate);
        }

        // Secondary gate: the local ledger already carries the payout.
        // Money must not move again; finish the bookkeeping instead.
        if self.ledger.has_claim_been_paid(&claim_id)? {
            self.append_executed(&authorization, &record.event_id, None)?;
            self.release_active_lock(&claim_id)?;
            debug!(claim_id = %claim_id, "payout already posted locally; consequence repaired");
            return Ok(ClaimOutcome::SkippedDuplicate);
        }

        let mut payout =
            PayoutTransaction::from_authorization(&authorization, record.event_id.clone());

        if authorization.amount_micros > self.config.approval_threshold_micros {
            payout.transition(PayoutStatus::ManualReview)?;
            info!(
                claim_id = %claim_id,
                amount = authorization.amount_micros,
                threshold = self.config.approval_threshold_micros,
                "payout parked for manual review"
            );
            return Ok(ClaimOutcome::ManualReview);
        }

        // Reserve liquidity; an existing active lock counts as reserved.
        match self.treasury.lock_funds(
            &authorization.pool_id,
            &claim_id,
            authorization.amount_micros,
            self.config.lock_ttl,
        ) {
            Ok(_) => {}
            Err(TreasuryError::DuplicateLock { .. }) => {
                debug!(claim_id = %claim_id, "claim already holds an active lock");
            }
            Err(TreasuryError::InsufficientLiquidity {
                requested_micros,
                available_micros,
                shortfall_micros,
                ..
            }) => {
                payout.transition(PayoutStatus::Failed)?;
                warn!(
                    claim_id = %claim_id,
                    requested = requested_micros,
                    available = available_micros,
                    shortfall = shortfall_micros,
                    "insufficient liquidity; payout failed terminally"
                );
                self.append_failed(
                    &authorization,
                    &record.event_id,
                    "INSUFFICIENT_LIQUIDITY",
                    &format!(
                        "pool {} short by {} micros",
                        authorization.pool_id, shortfall_micros
                    ),
                )?;
                return Ok(ClaimOutcome::Failed);
            }
            Err(TreasuryError::PoolNotFound(pool_id)) => {
                payout.transition(PayoutStatus::Failed)?;
                warn!(claim_id = %claim_id, pool_id = %pool_id, "authorization names an unknown pool");
                self.append_failed(
                    &authorization,
                    &record.event_id,
                    "UNKNOWN_POOL",
                    &format!("pool {pool_id} does not exist"),
                )?;
                return Ok(ClaimOutcome::Failed);
            }
            Err(other) => return Err(other.into()),
        }
        payout.transition(PayoutStatus::Locked)?;

        payout.transition(PayoutStatus::Processing)?;
        let request = PayoutRequest {
            claim_id: claim_id.clone(),
            amount_micros: authorization.amount_micros,
            currency: authorization.currency,
            recipient: authorization.recipient.clone(),
            rail: authorization.rail,
            authorizing_event_id: record.event_id.clone(),
        };

        match self.executor.execute(&request) {
            Ok(receipt) => {
                payout.ledger_transaction_id = self.post_claim_expense(&authorization)?;
                self.append_executed(&authorization, &record.event_id, receipt.rail_reference)?;
                self.release_active_lock(&claim_id)?;
                payout.transition(PayoutStatus::Cleared)?;
                info!(
                    claim_id = %claim_id,
                    transaction_ref = %transaction_ref(&claim_id, &record.event_id),
                    "payout executed and recorded"
                );
                Ok(ClaimOutcome::Executed)
            }
            Err(failure) => {
                payout.transition(PayoutStatus::Failed)?;
                warn!(
                    claim_id = %claim_id,
                    code = %failure.code,
                    reason = %failure.reason,
                    "payout execution failed terminally"
                );
                self.append_failed(&authorization, &record.event_id, &failure.code, &failure.reason)?;
                // The lock stays put; the expiry sweep reclaims it.
                Ok(ClaimOutcome::Failed)
            }
        }
    }

    /// Post the balanced claim-expense transaction. A duplicate
    /// reference means a racing attempt already posted it; adopt that
    /// transaction instead of failing.
    fn post_claim_expense(
        &self,
        authorization: &ClaimPayoutAuthorized,
    ) -> Result<Option<TransactionId>, SettlementError> {
        let new = NewTransaction {
            description: format!("claim payout {}", authorization.claim_id),
            currency: authorization.currency,
            reference_id: authorization.claim_id.as_str().to_string(),
            reference_type: ReferenceType::Claim,
            created_by: self.config.producer.clone(),
            entries: vec![
                NewEntry::new(
                    CoreAccount::ExpenseClaims,
                    authorization.amount_micros,
                    authorization.currency,
                ),
                NewEntry::new(
                    authorization.pool_id.clone(),
                    -authorization.amount_micros,
                    authorization.currency,
                ),
            ],
        };

        match self.ledger.record_transaction(new) {
            Ok(transaction) => Ok(Some(transaction.id)),
            Err(LedgerError::DuplicateReference { .. }) => Ok(self
                .ledger
                .transaction_for_reference(
                    authorization.claim_id.as_str(),
                    ReferenceType::Claim,
                )?
                .map(|t| t.id)),
            Err(other) => Err(other.into()),
        }
    }

    fn append_executed(
        &self,
        authorization: &ClaimPayoutAuthorized,
        authorizing_event_id: &str,
        rail_reference: Option<String>,
    ) -> Result<(), SettlementError> {
        let payload = CapitalPayoutExecuted {
            claim_id: authorization.claim_id.clone(),
            amount_micros: authorization.amount_micros,
            currency: authorization.currency,
            transaction_ref: transaction_ref(&authorization.claim_id, authorizing_event_id),
            rail_reference,
            authorizing_event_id: authorizing_event_id.to_string(),
        };

        self.append_consequence(
            event_types::CAPITAL_PAYOUT_EXECUTED,
            &authorization.claim_id,
            authorizing_event_id,
            serde_json::to_value(&payload).map_err(|e| SettlementError::Encode(e.to_string()))?,
        )
    }

    fn append_failed(
        &self,
        authorization: &ClaimPayoutAuthorized,
        authorizing_event_id: &str,
        failure_code: &str,
        failure_reason: &str,
    ) -> Result<(), SettlementError> {
        let payload = CapitalPayoutFailed {
            claim_id: authorization.claim_id.clone(),
            amount_micros: authorization.amount_micros,
            currency: authorization.currency,
            failure_code: failure_code.to_string(),
            failure_reason: failure_reason.to_string(),
            authorizing_event_id: authorizing_event_id.to_string(),
        };

        self.append_consequence(
            event_types::CAPITAL_PAYOUT_FAILED,
            &authorization.claim_id,
            authorizing_event_id,
            serde_json::to_value(&payload).map_err(|e| SettlementError::Encode(e.to_string()))?,
        )
    }

    fn append_consequence(
        &self,
        event_type: &str,
        claim_id: &ClaimId,
        authorizing_event_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), SettlementError> {
        // The deterministic key makes re-sending the same consequence a
        // no-op at the remote log.
        self.remote.append(NewEventRecord {
            event_id: format!("capstream_{}", Uuid::now_v7().simple()),
            event_type: event_type.to_string(),
            schema_version: SCHEMA_VERSION,
            correlation_id: authorizing_event_id.to_string(),
            idempotency_key: consequence_key(event_type, claim_id),
            occurred_at: Utc::now(),
            producer: self.config.producer.clone(),
            subject: claim_id.as_str().to_string(),
            payload,
        })?;
        Ok(())
    }

    fn release_active_lock(&self, claim_id: &ClaimId) -> Result<(), SettlementError> {
        if let Some(lock) = self.treasury.active_lock_for_claim(claim_id)? {
            self.treasury.release_lock(&lock.id)?;
        }
        Ok(())
    }

    /// Spawn the worker loop in a background thread.
    pub fn spawn(mut self) -> WorkerHandle
    where
        L: 'static,
        X: 'static,
        LS: 'static,
        TS: 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = self.config.name.clone();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!(worker = %self.config.name, "settlement worker started");
                loop {
                    // Stop signal is honored between cycles only.
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    match self.run_cycle() {
                        Ok(report) if report.fetched > 0 => {
                            info!(
                                worker = %self.config.name,
                                fetched = report.fetched,
                                executed = report.executed,
                                failed = report.failed,
                                skipped = report.skipped_duplicate,
                                manual_review = report.manual_review,
                                invalid = report.invalid,
                                "reconciliation cycle completed"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            // One cycle's failure never kills the loop.
                            warn!(worker = %self.config.name, error = %err, "reconciliation cycle failed");
                        }
                    }

                    thread::sleep(self.config.poll_interval);
                }
                info!(worker = %name, "settlement worker stopped");
            })
            .expect("failed to spawn settlement worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ref_takes_first_eight_chars() {
        let claim = ClaimId::new("claim_7").unwrap();
        assert_eq!(
            transaction_ref(&claim, "auth_event_abc123"),
            "txn_claim_7_auth_eve"
        );
    }

    #[test]
    fn transaction_ref_tolerates_short_authorizing_ids() {
        let claim = ClaimId::new("claim_7").unwrap();
        assert_eq!(transaction_ref(&claim, "a1"), "txn_claim_7_a1");
    }

    #[test]
    fn consequence_keys_are_deterministic_per_claim() {
        let claim = ClaimId::new("claim_7").unwrap();
        assert_eq!(
            consequence_key(event_types::CAPITAL_PAYOUT_EXECUTED, &claim),
            "CAPITAL_PAYOUT_EXECUTED:claim_7"
        );
        assert_eq!(
            consequence_key(event_types::CAPITAL_PAYOUT_EXECUTED, &claim),
            consequence_key(event_types::CAPITAL_PAYOUT_EXECUTED, &claim),
        );
    }
}
