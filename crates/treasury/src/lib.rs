//! Treasury: liquidity pools, time-bounded fund locks, reserve alerts.
//!
//! Pool balances are mutated only through the store's transactional
//! operations; locking funds debits the pool, sweeping an expired lock
//! credits the capacity back, and releasing after successful settlement
//! does not (the capital has left the pool).

pub mod engine;
pub mod model;
pub mod store;
pub mod sweeper;

pub use engine::{NewPool, TreasuryEngine, TreasuryError};
pub use model::{
    AlertKind, FundLock, LiquidityCheckResult, LiquidityPool, LockStatus, PoolStatus,
    TreasuryAlert,
};
pub use store::{InMemoryTreasuryStore, TreasuryStore, TreasuryStoreError};
pub use sweeper::{LockSweeper, SweeperConfig, SweeperHandle};
