//! Treasury engine: liquidity checks, lock lifecycle, reserve alerting.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use capstream_core::{AccountKind, AlertId, ClaimId, Currency, LockId, PoolId};

use crate::model::{
    AlertKind, FundLock, LiquidityCheckResult, LiquidityPool, LockStatus, PoolStatus,
    TreasuryAlert,
};
use crate::store::{TreasuryStore, TreasuryStoreError};

/// Treasury engine error.
#[derive(Debug, Clone, Error)]
pub enum TreasuryError {
    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("lock not found: {0}")]
    LockNotFound(LockId),

    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    /// An active lock already reserves capital for this claim. Callers
    /// must treat this as "already done", not as a fault.
    #[error("an active lock already exists for claim {claim_id}")]
    DuplicateLock { claim_id: ClaimId },

    /// The pool cannot cover the requested amount. Carries the
    /// structured shortfall so callers can escalate to manual review.
    #[error(
        "insufficient liquidity in {pool_id}: requested {requested_micros}, available {available_micros}"
    )]
    InsufficientLiquidity {
        pool_id: PoolId,
        requested_micros: i64,
        available_micros: i64,
        shortfall_micros: i64,
    },

    #[error("treasury storage error: {0}")]
    Storage(String),
}

impl From<TreasuryStoreError> for TreasuryError {
    fn from(err: TreasuryStoreError) -> Self {
        match err {
            TreasuryStoreError::PoolNotFound(id) => TreasuryError::PoolNotFound(id),
            TreasuryStoreError::LockNotFound(id) => TreasuryError::LockNotFound(id),
            TreasuryStoreError::AlertNotFound(id) => TreasuryError::AlertNotFound(id),
            TreasuryStoreError::DuplicateActiveLock { claim_id } => {
                TreasuryError::DuplicateLock { claim_id }
            }
            TreasuryStoreError::InsufficientBalance {
                pool_id,
                available_micros,
                requested_micros,
            } => TreasuryError::InsufficientLiquidity {
                pool_id,
                requested_micros,
                available_micros,
                shortfall_micros: (requested_micros - available_micros).max(0),
            },
            other => TreasuryError::Storage(other.to_string()),
        }
    }
}

/// Parameters for creating a liquidity pool.
#[derive(Debug, Clone)]
pub struct NewPool {
    pub id: PoolId,
    pub name: String,
    pub currency: Currency,
    pub initial_balance_micros: i64,
    pub minimum_reserve_micros: i64,
}

/// Liquidity checks, lock lifecycle and low-reserve alerting over a
/// [`TreasuryStore`].
#[derive(Debug)]
pub struct TreasuryEngine<S: TreasuryStore> {
    store: S,
}

impl<S: TreasuryStore> TreasuryEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn create_pool(&self, new: NewPool) -> Result<LiquidityPool, TreasuryError> {
        let now = Utc::now();
        let pool = LiquidityPool {
            id: new.id,
            name: new.name,
            account_kind: AccountKind::Liability,
            currency: new.currency,
            balance_micros: new.initial_balance_micros,
            minimum_reserve_micros: new.minimum_reserve_micros,
            status: PoolStatus::Active,
            created_at: now,
            last_activity_at: now,
        };
        self.store.create_pool(pool.clone())?;
        info!(pool_id = %pool.id, balance = pool.balance_micros, "liquidity pool created");
        Ok(pool)
    }

    pub fn pool(&self, pool_id: &PoolId) -> Result<LiquidityPool, TreasuryError> {
        self.store
            .pool(pool_id)?
            .ok_or_else(|| TreasuryError::PoolNotFound(pool_id.clone()))
    }

    pub fn list_pools(&self) -> Result<Vec<LiquidityPool>, TreasuryError> {
        Ok(self.store.list_pools()?)
    }

    /// Can the pool cover `amount_micros` right now?
    ///
    /// Locked capital has already been debited from the balance, so the
    /// check compares the request against the current balance directly.
    pub fn check_liquidity(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
    ) -> Result<LiquidityCheckResult, TreasuryError> {
        let pool = self.pool(pool_id)?;

        let available = pool.balance_micros;
        let shortfall = (amount_micros - available).max(0);
        Ok(LiquidityCheckResult {
            pool_id: pool.id,
            requested_micros: amount_micros,
            available_micros: available,
            shortfall_micros: shortfall,
            status: pool.status,
            sufficient: shortfall == 0 && pool.status == PoolStatus::Active,
        })
    }

    /// Reserve capital for a claim: debit the pool and create a `Locked`
    /// record expiring at `now + ttl`.
    pub fn lock_funds(
        &self,
        pool_id: &PoolId,
        claim_id: &ClaimId,
        amount_micros: i64,
        ttl: Duration,
    ) -> Result<FundLock, TreasuryError> {
        if let Some(existing) = self.store.active_lock_for_claim(claim_id)? {
            return Err(TreasuryError::DuplicateLock {
                claim_id: existing.claim_id,
            });
        }

        let check = self.check_liquidity(pool_id, amount_micros)?;
        if !check.sufficient {
            self.record_liquidity_failure(pool_id, &check)?;
            return Err(TreasuryError::InsufficientLiquidity {
                pool_id: pool_id.clone(),
                requested_micros: check.requested_micros,
                available_micros: check.available_micros,
                shortfall_micros: check.shortfall_micros,
            });
        }

        let now = Utc::now();
        let pool = self.store.debit_pool(pool_id, amount_micros, now)?;

        let lock = FundLock {
            id: LockId::new(),
            pool_id: pool_id.clone(),
            claim_id: claim_id.clone(),
            amount_micros,
            locked_at: now,
            expires_at: now + ttl,
            status: LockStatus::Locked,
        };

        if let Err(err) = self.store.insert_lock(lock.clone()) {
            // A racing lock for the same claim won; return the capital.
            self.store.credit_pool(pool_id, amount_micros, Utc::now())?;
            return Err(err.into());
        }

        if pool.balance_micros == 0 {
            self.store
                .set_pool_status(pool_id, PoolStatus::Depleted, now)?;
        }
        self.evaluate_reserve(pool_id)?;

        info!(
            lock_id = %lock.id,
            pool_id = %pool_id,
            claim_id = %claim_id,
            amount = amount_micros,
            expires_at = %lock.expires_at,
            "funds locked"
        );
        Ok(lock)
    }

    /// Release a lock after successful settlement: `Locked → Released`.
    ///
    /// Idempotent: releasing an already-released or expired lock is a
    /// no-op, because settlement and the expiry sweep may race.
    pub fn release_lock(&self, lock_id: &LockId) -> Result<(), TreasuryError> {
        match self.store.transition_lock(lock_id, LockStatus::Released)? {
            Some(lock) => {
                info!(lock_id = %lock.id, claim_id = %lock.claim_id, "lock released");
            }
            None => {
                debug!(lock_id = %lock_id, "release was a no-op; lock already terminal");
            }
        }
        Ok(())
    }

    /// Expire every overdue lock and return its capacity to the pool.
    ///
    /// The compensating action for authorizations that were never
    /// settled. Safe to run repeatedly and concurrently: the monotonic
    /// status transition makes each lock expire at most once.
    pub fn sweep_expired_locks(&self) -> Result<Vec<FundLock>, TreasuryError> {
        self.sweep_expired_locks_at(Utc::now())
    }

    /// Sweep with an explicit cutoff (used by tests and the sweeper).
    pub fn sweep_expired_locks_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<FundLock>, TreasuryError> {
        let mut swept = Vec::new();

        for lock in self.store.expired_locks(now)? {
            // A racing sweep or settlement may already have moved it on.
            let Some(expired) = self.store.transition_lock(&lock.id, LockStatus::Expired)? else {
                continue;
            };

            let pool = self
                .store
                .credit_pool(&expired.pool_id, expired.amount_micros, now)?;
            if pool.status == PoolStatus::Depleted && pool.balance_micros > 0 {
                self.store
                    .set_pool_status(&expired.pool_id, PoolStatus::Active, now)?;
            }

            info!(
                lock_id = %expired.id,
                pool_id = %expired.pool_id,
                claim_id = %expired.claim_id,
                amount = expired.amount_micros,
                "expired lock swept; capacity returned"
            );
            swept.push(expired);
        }

        Ok(swept)
    }

    /// Compare the pool balance to its minimum reserve and emit at most
    /// one unacknowledged alert of a kind per breach episode.
    pub fn evaluate_reserve(
        &self,
        pool_id: &PoolId,
    ) -> Result<Option<TreasuryAlert>, TreasuryError> {
        let pool = self.pool(pool_id)?;

        let (kind, threshold) = if pool.balance_micros < pool.minimum_reserve_micros / 2 {
            (AlertKind::CriticalLow, pool.minimum_reserve_micros / 2)
        } else if pool.balance_micros < pool.minimum_reserve_micros {
            (AlertKind::WarningLow, pool.minimum_reserve_micros)
        } else {
            return Ok(None);
        };

        if self.store.has_unacknowledged_alert(pool_id, kind)? {
            return Ok(None);
        }

        let alert = TreasuryAlert {
            id: AlertId::new(),
            pool_id: pool.id,
            kind,
            balance_micros: pool.balance_micros,
            threshold_micros: threshold,
            created_at: Utc::now(),
            acknowledged: false,
        };
        self.store.insert_alert(alert.clone())?;
        warn!(
            pool_id = %pool_id,
            kind = ?kind,
            balance = alert.balance_micros,
            threshold = alert.threshold_micros,
            "reserve alert emitted"
        );
        Ok(Some(alert))
    }

    /// Credit a pool (remittance intake). Reactivates a depleted pool.
    pub fn credit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
    ) -> Result<LiquidityPool, TreasuryError> {
        let now = Utc::now();
        let pool = self.store.credit_pool(pool_id, amount_micros, now)?;
        let pool = if pool.status == PoolStatus::Depleted && pool.balance_micros > 0 {
            self.store
                .set_pool_status(pool_id, PoolStatus::Active, now)?
        } else {
            pool
        };
        debug!(pool_id = %pool_id, amount = amount_micros, balance = pool.balance_micros, "pool credited");
        Ok(pool)
    }

    /// Operator action: suspend or reactivate a pool.
    pub fn set_pool_status(
        &self,
        pool_id: &PoolId,
        status: PoolStatus,
    ) -> Result<LiquidityPool, TreasuryError> {
        Ok(self.store.set_pool_status(pool_id, status, Utc::now())?)
    }

    pub fn acknowledge_alert(&self, alert_id: &AlertId) -> Result<TreasuryAlert, TreasuryError> {
        Ok(self.store.acknowledge_alert(alert_id)?)
    }

    pub fn alerts_for_pool(&self, pool_id: &PoolId) -> Result<Vec<TreasuryAlert>, TreasuryError> {
        Ok(self.store.alerts_for_pool(pool_id)?)
    }

    pub fn active_lock_for_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Option<FundLock>, TreasuryError> {
        Ok(self.store.active_lock_for_claim(claim_id)?)
    }

    fn record_liquidity_failure(
        &self,
        pool_id: &PoolId,
        check: &LiquidityCheckResult,
    ) -> Result<(), TreasuryError> {
        if self
            .store
            .has_unacknowledged_alert(pool_id, AlertKind::LiquidityFailure)?
        {
            return Ok(());
        }

        let alert = TreasuryAlert {
            id: AlertId::new(),
            pool_id: pool_id.clone(),
            kind: AlertKind::LiquidityFailure,
            balance_micros: check.available_micros,
            threshold_micros: check.requested_micros,
            created_at: Utc::now(),
            acknowledged: false,
        };
        self.store.insert_alert(alert)?;
        warn!(
            pool_id = %pool_id,
            requested = check.requested_micros,
            available = check.available_micros,
            shortfall = check.shortfall_micros,
            "liquidity check failed for lock request"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTreasuryStore;

    fn engine() -> TreasuryEngine<InMemoryTreasuryStore> {
        TreasuryEngine::new(InMemoryTreasuryStore::new())
    }

    fn pool_x(engine: &TreasuryEngine<InMemoryTreasuryStore>, balance: i64) -> PoolId {
        let id = PoolId::new("pool_x").unwrap();
        engine
            .create_pool(NewPool {
                id: id.clone(),
                name: "Claims reserve".to_string(),
                currency: Currency::Usd,
                initial_balance_micros: balance,
                minimum_reserve_micros: 200_000,
            })
            .unwrap();
        id
    }

    fn claim(raw: &str) -> ClaimId {
        ClaimId::new(raw).unwrap()
    }

    #[test]
    fn liquidity_check_reports_shortfall() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);

        let ok = engine.check_liquidity(&pool, 900_000).unwrap();
        assert!(ok.sufficient);
        assert_eq!(ok.shortfall_micros, 0);

        let short = engine.check_liquidity(&pool, 1_500_000).unwrap();
        assert!(!short.sufficient);
        assert_eq!(short.shortfall_micros, 500_000);
        assert_eq!(short.available_micros, 1_000_000);
    }

    #[test]
    fn suspended_pool_is_never_sufficient() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);
        engine.set_pool_status(&pool, PoolStatus::Suspended).unwrap();

        let check = engine.check_liquidity(&pool, 100).unwrap();
        assert!(!check.sufficient);
        assert_eq!(check.shortfall_micros, 0);
    }

    #[test]
    fn deep_breach_emits_critical() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);
        // Leaves 50_000, below minimum_reserve / 2 = 100_000.
        engine
            .lock_funds(&pool, &claim("claim_1"), 950_000, Duration::hours(1))
            .unwrap();

        let alerts = engine.alerts_for_pool(&pool).unwrap();
        assert!(alerts.iter().any(|a| a.kind == AlertKind::CriticalLow));
    }

    #[test]
    fn lock_debits_pool_and_blocks_duplicates() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);

        let lock = engine
            .lock_funds(&pool, &claim("claim_1"), 900_000, Duration::hours(1))
            .unwrap();
        assert_eq!(lock.status, LockStatus::Locked);
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 100_000);

        let err = engine
            .lock_funds(&pool, &claim("claim_1"), 50_000, Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, TreasuryError::DuplicateLock { .. }));
    }

    #[test]
    fn insufficient_lock_fails_with_shortfall_and_alert() {
        let engine = engine();
        let pool = pool_x(&engine, 100_000);

        let err = engine
            .lock_funds(&pool, &claim("claim_1"), 900_000, Duration::hours(1))
            .unwrap_err();
        let TreasuryError::InsufficientLiquidity {
            shortfall_micros, ..
        } = err
        else {
            panic!("expected insufficiency, got {err:?}");
        };
        assert_eq!(shortfall_micros, 800_000);

        let alerts = engine.alerts_for_pool(&pool).unwrap();
        assert!(alerts.iter().any(|a| a.kind == AlertKind::LiquidityFailure));
        // Balance untouched by the failed lock.
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 100_000);
    }

    #[test]
    fn release_is_idempotent_and_keeps_capital_out() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);
        let lock = engine
            .lock_funds(&pool, &claim("claim_1"), 900_000, Duration::hours(1))
            .unwrap();

        engine.release_lock(&lock.id).unwrap();
        engine.release_lock(&lock.id).unwrap();

        // Settled capital does not return to the pool.
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 100_000);
    }

    #[test]
    fn sweep_expires_each_lock_exactly_once() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);
        let lock = engine
            .lock_funds(&pool, &claim("claim_1"), 900_000, Duration::minutes(30))
            .unwrap();

        // Before expiry: no-op.
        let swept = engine.sweep_expired_locks_at(Utc::now()).unwrap();
        assert!(swept.is_empty());
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 100_000);

        // After expiry: expires once and returns the capacity.
        let later = lock.expires_at + Duration::seconds(1);
        let swept = engine.sweep_expired_locks_at(later).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].status, LockStatus::Expired);
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 1_000_000);

        // Repeating the sweep has no additional effect.
        let swept = engine.sweep_expired_locks_at(later).unwrap();
        assert!(swept.is_empty());
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 1_000_000);
    }

    #[test]
    fn release_after_expiry_is_a_noop() {
        let engine = engine();
        let pool = pool_x(&engine, 1_000_000);
        let lock = engine
            .lock_funds(&pool, &claim("claim_1"), 900_000, Duration::minutes(5))
            .unwrap();

        let later = lock.expires_at + Duration::seconds(1);
        engine.sweep_expired_locks_at(later).unwrap();
        engine.release_lock(&lock.id).unwrap();

        // Expiry already returned the capital; release must not double it.
        assert_eq!(engine.pool(&pool).unwrap().balance_micros, 1_000_000);
    }

    #[test]
    fn reserve_alerts_fire_once_per_breach_episode() {
        let engine = engine();
        // minimum_reserve 200_000; balance drops below it after lock.
        let pool = pool_x(&engine, 1_000_000);
        engine
            .lock_funds(&pool, &claim("claim_1"), 900_000, Duration::hours(1))
            .unwrap();

        let alerts = engine.alerts_for_pool(&pool).unwrap();
        let warnings: Vec<_> = alerts
            .iter()
            .filter(|a| a.kind == AlertKind::WarningLow)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].balance_micros, 100_000);

        // While unacknowledged, the same breach does not re-emit.
        assert!(engine.evaluate_reserve(&pool).unwrap().is_none());

        // After acknowledgement a new breach may emit again.
        engine.acknowledge_alert(&warnings[0].id).unwrap();
        let again = engine.evaluate_reserve(&pool).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn draining_pool_marks_it_depleted_and_credit_reactivates() {
        let engine = engine();
        let pool = pool_x(&engine, 500_000);
        engine
            .lock_funds(&pool, &claim("claim_1"), 500_000, Duration::hours(1))
            .unwrap();

        assert_eq!(engine.pool(&pool).unwrap().status, PoolStatus::Depleted);

        engine.credit_pool(&pool, 250_000).unwrap();
        let pool_state = engine.pool(&pool).unwrap();
        assert_eq!(pool_state.status, PoolStatus::Active);
        assert_eq!(pool_state.balance_micros, 250_000);
    }
}
