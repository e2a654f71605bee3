use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capstream_core::{AccountKind, AlertId, ClaimId, Currency, LedgerAccount, LockId, PoolId};

/// Lifecycle status of a liquidity pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    Suspended,
    Depleted,
}

/// A segregated, currency-denominated reserve backing payout obligations.
///
/// `balance_micros` is a cache of the pool's ledger-entry sums and must
/// stay consistent with them; it moves only through the store's
/// credit/debit operations, which also update `last_activity_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub id: PoolId,
    pub name: String,
    /// Liability-reserve class; pools never hold any other kind.
    pub account_kind: AccountKind,
    pub currency: Currency,
    pub balance_micros: i64,
    pub minimum_reserve_micros: i64,
    pub status: PoolStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl LiquidityPool {
    /// The ledger account carrying this pool's liability entries.
    pub fn liability_account(&self) -> LedgerAccount {
        LedgerAccount::Pool(self.id.clone())
    }
}

/// Lifecycle status of a fund lock. Transitions are monotonic:
/// `Locked → Released` (settled) or `Locked → Expired` (swept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Locked,
    Released,
    Expired,
}

/// Capital reserved against one claim pending settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundLock {
    pub id: LockId,
    pub pool_id: PoolId,
    pub claim_id: ClaimId,
    pub amount_micros: i64,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: LockStatus,
}

impl FundLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == LockStatus::Locked && self.expires_at < now
    }
}

/// Kind of treasury notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CriticalLow,
    WarningLow,
    LiquidityFailure,
}

/// Immutable notification record. Only the acknowledgement flag ever
/// changes, exactly once (false → true).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryAlert {
    pub id: AlertId,
    pub pool_id: PoolId,
    pub kind: AlertKind,
    pub balance_micros: i64,
    pub threshold_micros: i64,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Outcome of a liquidity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidityCheckResult {
    pub pool_id: PoolId,
    pub requested_micros: i64,
    pub available_micros: i64,
    /// `max(0, requested − available)`.
    pub shortfall_micros: i64,
    pub status: PoolStatus,
    pub sufficient: bool,
}
