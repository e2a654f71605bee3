//! Account taxonomy for the double-entry ledger.
//!
//! The chart of accounts is fixed: a small set of system accounts plus a
//! dynamically-named liability account per liquidity pool. Accounts are
//! tagged variants internally; the string representation is translated
//! only at external boundaries (ingress payloads, event payloads).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::PoolId;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Expense,
}

/// Fixed system accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreAccount {
    /// Pooled operating capital held by the platform.
    AssetTreasury,
    /// Aggregate reserve owed against future payouts.
    LiabilityReserve,
    /// Claim payouts recognized as expense.
    ExpenseClaims,
}

impl CoreAccount {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreAccount::AssetTreasury => "ASSET_TREASURY",
            CoreAccount::LiabilityReserve => "LIABILITY_RESERVE",
            CoreAccount::ExpenseClaims => "EXPENSE_CLAIMS",
        }
    }

    pub fn kind(&self) -> AccountKind {
        match self {
            CoreAccount::AssetTreasury => AccountKind::Asset,
            CoreAccount::LiabilityReserve => AccountKind::Liability,
            CoreAccount::ExpenseClaims => AccountKind::Expense,
        }
    }
}

/// A ledger account: a fixed system account or a per-pool liability
/// account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LedgerAccount {
    Core(CoreAccount),
    Pool(PoolId),
}

const POOL_ACCOUNT_PREFIX: &str = "POOL_LIABILITY_";

impl LedgerAccount {
    pub fn kind(&self) -> AccountKind {
        match self {
            LedgerAccount::Core(core) => core.kind(),
            LedgerAccount::Pool(_) => AccountKind::Liability,
        }
    }

    /// The external string form, e.g. `ASSET_TREASURY` or
    /// `POOL_LIABILITY_pool_x`.
    pub fn to_wire(&self) -> String {
        match self {
            LedgerAccount::Core(core) => core.as_str().to_string(),
            LedgerAccount::Pool(pool_id) => format!("{POOL_ACCOUNT_PREFIX}{pool_id}"),
        }
    }
}

impl core::fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for LedgerAccount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSET_TREASURY" => Ok(LedgerAccount::Core(CoreAccount::AssetTreasury)),
            "LIABILITY_RESERVE" => Ok(LedgerAccount::Core(CoreAccount::LiabilityReserve)),
            "EXPENSE_CLAIMS" => Ok(LedgerAccount::Core(CoreAccount::ExpenseClaims)),
            other => {
                let Some(pool_raw) = other.strip_prefix(POOL_ACCOUNT_PREFIX) else {
                    return Err(DomainError::invalid_id(format!(
                        "unrecognized account: {other}"
                    )));
                };
                let pool_id = PoolId::new(pool_raw)?;
                Ok(LedgerAccount::Pool(pool_id))
            }
        }
    }
}

impl TryFrom<String> for LedgerAccount {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LedgerAccount> for String {
    fn from(value: LedgerAccount) -> Self {
        value.to_wire()
    }
}

impl From<CoreAccount> for LedgerAccount {
    fn from(value: CoreAccount) -> Self {
        LedgerAccount::Core(value)
    }
}

impl From<PoolId> for LedgerAccount {
    fn from(value: PoolId) -> Self {
        LedgerAccount::Pool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_accounts_round_trip() {
        for account in [
            CoreAccount::AssetTreasury,
            CoreAccount::LiabilityReserve,
            CoreAccount::ExpenseClaims,
        ] {
            let wire = LedgerAccount::Core(account).to_wire();
            let parsed: LedgerAccount = wire.parse().unwrap();
            assert_eq!(parsed, LedgerAccount::Core(account));
        }
    }

    #[test]
    fn pool_account_parses_pool_id() {
        let parsed: LedgerAccount = "POOL_LIABILITY_pool_x".parse().unwrap();
        let LedgerAccount::Pool(pool_id) = &parsed else {
            panic!("expected pool account");
        };
        assert_eq!(pool_id.as_str(), "pool_x");
        assert_eq!(parsed.kind(), AccountKind::Liability);
    }

    #[test]
    fn malformed_accounts_are_rejected() {
        assert!("TREASURY".parse::<LedgerAccount>().is_err());
        assert!("POOL_LIABILITY_".parse::<LedgerAccount>().is_err());
        assert!("POOL_LIABILITY_BAD-ID".parse::<LedgerAccount>().is_err());
    }
}
