//! Treasury persistence: pools, fund locks, alerts.
//!
//! Every mutation is a transactional store operation executed under one
//! write lock: balance debits are check-and-act (no decide-then-debit
//! race), lock insertion enforces the one-active-lock-per-claim rule,
//! and lock status transitions are guarded so each lock transitions at
//! most once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use capstream_core::{AlertId, ClaimId, LockId, PoolId};

use crate::model::{AlertKind, FundLock, LiquidityPool, LockStatus, PoolStatus, TreasuryAlert};

/// Treasury store operation error.
#[derive(Debug, Clone, Error)]
pub enum TreasuryStoreError {
    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("pool already exists: {0}")]
    PoolExists(PoolId),

    #[error("lock not found: {0}")]
    LockNotFound(LockId),

    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("an active lock already exists for claim {claim_id}")]
    DuplicateActiveLock { claim_id: ClaimId },

    #[error("pool {pool_id} has {available_micros} micros, requested {requested_micros}")]
    InsufficientBalance {
        pool_id: PoolId,
        available_micros: i64,
        requested_micros: i64,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Mutable treasury state behind transactional operations.
pub trait TreasuryStore: Send + Sync {
    fn create_pool(&self, pool: LiquidityPool) -> Result<(), TreasuryStoreError>;

    fn pool(&self, pool_id: &PoolId) -> Result<Option<LiquidityPool>, TreasuryStoreError>;

    fn list_pools(&self) -> Result<Vec<LiquidityPool>, TreasuryStoreError>;

    /// Add to the pool balance and stamp `last_activity_at`.
    fn credit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError>;

    /// Subtract from the pool balance and stamp `last_activity_at`.
    /// Check-and-act: fails without effect if the balance is short.
    fn debit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError>;

    fn set_pool_status(
        &self,
        pool_id: &PoolId,
        status: PoolStatus,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError>;

    /// Insert a new lock, enforcing at most one `Locked` lock per claim.
    fn insert_lock(&self, lock: FundLock) -> Result<(), TreasuryStoreError>;

    fn lock(&self, lock_id: &LockId) -> Result<Option<FundLock>, TreasuryStoreError>;

    fn active_lock_for_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Option<FundLock>, TreasuryStoreError>;

    /// Transition a lock out of `Locked`. Returns the updated lock, or
    /// `None` if the lock had already left `Locked` (monotonic guard).
    fn transition_lock(
        &self,
        lock_id: &LockId,
        to: LockStatus,
    ) -> Result<Option<FundLock>, TreasuryStoreError>;

    /// All `Locked` locks whose `expires_at` is strictly before `now`.
    fn expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<FundLock>, TreasuryStoreError>;

    fn insert_alert(&self, alert: TreasuryAlert) -> Result<(), TreasuryStoreError>;

    fn alerts_for_pool(&self, pool_id: &PoolId) -> Result<Vec<TreasuryAlert>, TreasuryStoreError>;

    fn has_unacknowledged_alert(
        &self,
        pool_id: &PoolId,
        kind: AlertKind,
    ) -> Result<bool, TreasuryStoreError>;

    /// Flip the acknowledgement flag false → true. Idempotent.
    fn acknowledge_alert(&self, alert_id: &AlertId) -> Result<TreasuryAlert, TreasuryStoreError>;
}

impl<S> TreasuryStore for Arc<S>
where
    S: TreasuryStore + ?Sized,
{
    fn create_pool(&self, pool: LiquidityPool) -> Result<(), TreasuryStoreError> {
        (**self).create_pool(pool)
    }

    fn pool(&self, pool_id: &PoolId) -> Result<Option<LiquidityPool>, TreasuryStoreError> {
        (**self).pool(pool_id)
    }

    fn list_pools(&self) -> Result<Vec<LiquidityPool>, TreasuryStoreError> {
        (**self).list_pools()
    }

    fn credit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError> {
        (**self).credit_pool(pool_id, amount_micros, now)
    }

    fn debit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError> {
        (**self).debit_pool(pool_id, amount_micros, now)
    }

    fn set_pool_status(
        &self,
        pool_id: &PoolId,
        status: PoolStatus,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError> {
        (**self).set_pool_status(pool_id, status, now)
    }

    fn insert_lock(&self, lock: FundLock) -> Result<(), TreasuryStoreError> {
        (**self).insert_lock(lock)
    }

    fn lock(&self, lock_id: &LockId) -> Result<Option<FundLock>, TreasuryStoreError> {
        (**self).lock(lock_id)
    }

    fn active_lock_for_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Option<FundLock>, TreasuryStoreError> {
        (**self).active_lock_for_claim(claim_id)
    }

    fn transition_lock(
        &self,
        lock_id: &LockId,
        to: LockStatus,
    ) -> Result<Option<FundLock>, TreasuryStoreError> {
        (**self).transition_lock(lock_id, to)
    }

    fn expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<FundLock>, TreasuryStoreError> {
        (**self).expired_locks(now)
    }

    fn insert_alert(&self, alert: TreasuryAlert) -> Result<(), TreasuryStoreError> {
        (**self).insert_alert(alert)
    }

    fn alerts_for_pool(&self, pool_id: &PoolId) -> Result<Vec<TreasuryAlert>, TreasuryStoreError> {
        (**self).alerts_for_pool(pool_id)
    }

    fn has_unacknowledged_alert(
        &self,
        pool_id: &PoolId,
        kind: AlertKind,
    ) -> Result<bool, TreasuryStoreError> {
        (**self).has_unacknowledged_alert(pool_id, kind)
    }

    fn acknowledge_alert(&self, alert_id: &AlertId) -> Result<TreasuryAlert, TreasuryStoreError> {
        (**self).acknowledge_alert(alert_id)
    }
}

#[derive(Debug, Default)]
struct TreasuryState {
    pools: HashMap<PoolId, LiquidityPool>,
    locks: HashMap<LockId, FundLock>,
    alerts: HashMap<AlertId, TreasuryAlert>,
}

/// In-memory treasury store.
#[derive(Debug, Default)]
pub struct InMemoryTreasuryStore {
    state: RwLock<TreasuryState>,
}

impl InMemoryTreasuryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> TreasuryStoreError {
    TreasuryStoreError::Storage("lock poisoned".to_string())
}

impl TreasuryStore for InMemoryTreasuryStore {
    fn create_pool(&self, pool: LiquidityPool) -> Result<(), TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.pools.contains_key(&pool.id) {
            return Err(TreasuryStoreError::PoolExists(pool.id));
        }
        state.pools.insert(pool.id.clone(), pool);
        Ok(())
    }

    fn pool(&self, pool_id: &PoolId) -> Result<Option<LiquidityPool>, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.pools.get(pool_id).cloned())
    }

    fn list_pools(&self) -> Result<Vec<LiquidityPool>, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut pools: Vec<_> = state.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(pools)
    }

    fn credit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let pool = state
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| TreasuryStoreError::PoolNotFound(pool_id.clone()))?;

        pool.balance_micros = pool
            .balance_micros
            .checked_add(amount_micros)
            .ok_or_else(|| TreasuryStoreError::Storage("pool balance overflow".to_string()))?;
        pool.last_activity_at = now;
        Ok(pool.clone())
    }

    fn debit_pool(
        &self,
        pool_id: &PoolId,
        amount_micros: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let pool = state
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| TreasuryStoreError::PoolNotFound(pool_id.clone()))?;

        if pool.balance_micros < amount_micros {
            return Err(TreasuryStoreError::InsufficientBalance {
                pool_id: pool_id.clone(),
                available_micros: pool.balance_micros,
                requested_micros: amount_micros,
            });
        }

        pool.balance_micros -= amount_micros;
        pool.last_activity_at = now;
        Ok(pool.clone())
    }

    fn set_pool_status(
        &self,
        pool_id: &PoolId,
        status: PoolStatus,
        now: DateTime<Utc>,
    ) -> Result<LiquidityPool, TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let pool = state
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| TreasuryStoreError::PoolNotFound(pool_id.clone()))?;

        pool.status = status;
        pool.last_activity_at = now;
        Ok(pool.clone())
    }

    fn insert_lock(&self, lock: FundLock) -> Result<(), TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let duplicate = state
            .locks
            .values()
            .any(|l| l.claim_id == lock.claim_id && l.status == LockStatus::Locked);
        if duplicate {
            return Err(TreasuryStoreError::DuplicateActiveLock {
                claim_id: lock.claim_id,
            });
        }

        state.locks.insert(lock.id, lock);
        Ok(())
    }

    fn lock(&self, lock_id: &LockId) -> Result<Option<FundLock>, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.locks.get(lock_id).cloned())
    }

    fn active_lock_for_claim(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Option<FundLock>, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .locks
            .values()
            .find(|l| &l.claim_id == claim_id && l.status == LockStatus::Locked)
            .cloned())
    }

    fn transition_lock(
        &self,
        lock_id: &LockId,
        to: LockStatus,
    ) -> Result<Option<FundLock>, TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let lock = state
            .locks
            .get_mut(lock_id)
            .ok_or(TreasuryStoreError::LockNotFound(*lock_id))?;

        if lock.status != LockStatus::Locked {
            return Ok(None);
        }

        lock.status = to;
        Ok(Some(lock.clone()))
    }

    fn expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<FundLock>, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut expired: Vec<_> = state
            .locks
            .values()
            .filter(|l| l.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|l| l.locked_at);
        Ok(expired)
    }

    fn insert_alert(&self, alert: TreasuryAlert) -> Result<(), TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.alerts.insert(alert.id, alert);
        Ok(())
    }

    fn alerts_for_pool(&self, pool_id: &PoolId) -> Result<Vec<TreasuryAlert>, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut alerts: Vec<_> = state
            .alerts
            .values()
            .filter(|a| &a.pool_id == pool_id)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    fn has_unacknowledged_alert(
        &self,
        pool_id: &PoolId,
        kind: AlertKind,
    ) -> Result<bool, TreasuryStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .alerts
            .values()
            .any(|a| &a.pool_id == pool_id && a.kind == kind && !a.acknowledged))
    }

    fn acknowledge_alert(&self, alert_id: &AlertId) -> Result<TreasuryAlert, TreasuryStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let alert = state
            .alerts
            .get_mut(alert_id)
            .ok_or(TreasuryStoreError::AlertNotFound(*alert_id))?;

        alert.acknowledged = true;
        Ok(alert.clone())
    }
}
