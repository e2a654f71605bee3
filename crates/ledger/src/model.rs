use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capstream_core::{Currency, EntryId, LedgerAccount, TransactionId};

use crate::engine::LedgerError;

/// What class of business event caused a ledger entry.
///
/// The `(reference_id, reference_type)` pair is the idempotency handle:
/// one committed transaction per pair, ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    /// A payment-provider capture event (provider event id).
    PaymentEvent,
    /// A claim payout (claim id).
    Claim,
    /// A pool-scoped remittance credit (remittance reference).
    Remittance,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::PaymentEvent => "payment_event",
            ReferenceType::Claim => "claim",
            ReferenceType::Remittance => "remittance",
        }
    }
}

impl core::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable leg of a committed transaction.
///
/// Never updated or deleted after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub transaction_id: TransactionId,
    pub account: LedgerAccount,
    /// Signed amount in micro-units.
    pub amount_micros: i64,
    pub currency: Currency,
    pub reference_id: String,
    pub reference_type: ReferenceType,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A committed, balanced group of ≥2 entries. Created once, atomically,
/// with all its entries; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub description: String,
    pub currency: Currency,
    pub reference_id: String,
    pub reference_type: ReferenceType,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An uncommitted leg, as submitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account: LedgerAccount,
    pub amount_micros: i64,
    pub currency: Currency,
    pub memo: Option<String>,
}

impl NewEntry {
    pub fn new(account: impl Into<LedgerAccount>, amount_micros: i64, currency: Currency) -> Self {
        Self {
            account: account.into(),
            amount_micros,
            currency,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Boundary translator for external string account identifiers.
    pub fn from_wire(
        account: &str,
        amount_micros: i64,
        currency: Currency,
    ) -> Result<Self, LedgerError> {
        let account: LedgerAccount = account
            .parse()
            .map_err(|e| LedgerError::InvalidAccount(format!("{e}")))?;
        Ok(Self::new(account, amount_micros, currency))
    }
}

/// An uncommitted transaction, as submitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub description: String,
    pub currency: Currency,
    pub reference_id: String,
    pub reference_type: ReferenceType,
    pub created_by: String,
    pub entries: Vec<NewEntry>,
}

/// Derived balance for an (account, currency) pair.
///
/// Not stored as truth: recomputed from the entry log on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account: LedgerAccount,
    pub currency: Currency,
    /// Signed sum of all entry amounts, in micro-units.
    pub balance_micros: i128,
    pub entry_count: usize,
    pub last_entry_id: Option<EntryId>,
    pub last_entry_at: Option<DateTime<Utc>>,
}

impl AccountBalance {
    pub fn empty(account: LedgerAccount, currency: Currency) -> Self {
        Self {
            account,
            currency,
            balance_micros: 0,
            entry_count: 0,
            last_entry_id: None,
            last_entry_at: None,
        }
    }
}
