//! Ledger accounting engine.
//!
//! Validates and commits balanced transactions through a [`LedgerStore`]
//! and serves derived balance reads. The engine enforces the zero-sum
//! invariant and reference idempotency; atomicity of the commit itself
//! is the store's contract.

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use capstream_core::{ClaimId, CoreAccount, Currency, EntryId, LedgerAccount, TransactionId};

use crate::model::{
    AccountBalance, LedgerEntry, LedgerTransaction, NewTransaction, ReferenceType,
};
use crate::store::{LedgerStore, LedgerStoreError};

/// Ledger engine error.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// A transaction needs at least two legs.
    #[error("transaction must have at least 2 entries, got {count}")]
    InsufficientEntries { count: usize },

    /// Signed entry amounts must sum to exactly zero.
    #[error("transaction entries sum to {sum_micros} micros, expected 0")]
    ImbalancedTransaction { sum_micros: i128 },

    /// Every leg must carry the transaction's declared currency.
    #[error("entry currency {found} does not match transaction currency {expected}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    /// Zero-amount legs are meaningless and rejected.
    #[error("entry for {account} has zero amount")]
    ZeroAmountEntry { account: LedgerAccount },

    /// A malformed account identifier at the boundary.
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    /// The reference was already used by a committed transaction.
    /// Callers must treat this as "already done", not as a fault.
    #[error("duplicate reference: {reference_id} ({reference_type})")]
    DuplicateReference {
        reference_id: String,
        reference_type: ReferenceType,
    },

    /// Underlying storage failure; the attempted commit had no effect.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

impl From<LedgerStoreError> for LedgerError {
    fn from(err: LedgerStoreError) -> Self {
        match err {
            LedgerStoreError::DuplicateReference {
                reference_id,
                reference_type,
            } => LedgerError::DuplicateReference {
                reference_id,
                reference_type,
            },
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

/// Validates and commits transactions; computes derived balances.
#[derive(Debug)]
pub struct LedgerEngine<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate and atomically commit a balanced transaction.
    ///
    /// Either the transaction header and every entry become visible
    /// together, or nothing does.
    pub fn record_transaction(
        &self,
        new: NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        if new.entries.len() < 2 {
            return Err(LedgerError::InsufficientEntries {
                count: new.entries.len(),
            });
        }

        let mut sum: i128 = 0;
        for entry in &new.entries {
            if entry.currency != new.currency {
                return Err(LedgerError::CurrencyMismatch {
                    expected: new.currency,
                    found: entry.currency,
                });
            }
            if entry.amount_micros == 0 {
                return Err(LedgerError::ZeroAmountEntry {
                    account: entry.account.clone(),
                });
            }
            sum += entry.amount_micros as i128;
        }
        if sum != 0 {
            return Err(LedgerError::ImbalancedTransaction { sum_micros: sum });
        }

        let transaction_id = TransactionId::new();
        let now = Utc::now();

        let transaction = LedgerTransaction {
            id: transaction_id,
            description: new.description,
            currency: new.currency,
            reference_id: new.reference_id.clone(),
            reference_type: new.reference_type,
            created_by: new.created_by,
            created_at: now,
        };

        let entries: Vec<LedgerEntry> = new
            .entries
            .into_iter()
            .map(|e| LedgerEntry {
                id: EntryId::new(),
                transaction_id,
                account: e.account,
                amount_micros: e.amount_micros,
                currency: e.currency,
                reference_id: new.reference_id.clone(),
                reference_type: new.reference_type,
                memo: e.memo,
                created_at: now,
            })
            .collect();

        let entry_count = entries.len();
        self.store.insert_transaction(transaction.clone(), entries)?;

        debug!(
            transaction_id = %transaction.id,
            reference_id = %transaction.reference_id,
            reference_type = %transaction.reference_type,
            entries = entry_count,
            "ledger transaction committed"
        );

        Ok(transaction)
    }

    /// Derived balance for one (account, currency) pair.
    pub fn account_balance(
        &self,
        account: &LedgerAccount,
        currency: Currency,
    ) -> Result<AccountBalance, LedgerError> {
        let entries = self.store.entries_for_account(account, currency)?;

        let mut balance = AccountBalance::empty(account.clone(), currency);
        for entry in &entries {
            balance.balance_micros += entry.amount_micros as i128;
        }
        balance.entry_count = entries.len();
        if let Some(last) = entries.last() {
            balance.last_entry_id = Some(last.id);
            balance.last_entry_at = Some(last.created_at);
        }

        Ok(balance)
    }

    /// Derived balances for every (account, currency) pair with entries,
    /// sorted by account wire form then currency.
    pub fn all_account_balances(&self) -> Result<Vec<AccountBalance>, LedgerError> {
        let entries = self.store.all_entries()?;

        let mut grouped: HashMap<(LedgerAccount, Currency), AccountBalance> = HashMap::new();
        for entry in entries {
            let balance = grouped
                .entry((entry.account.clone(), entry.currency))
                .or_insert_with(|| AccountBalance::empty(entry.account.clone(), entry.currency));
            balance.balance_micros += entry.amount_micros as i128;
            balance.entry_count += 1;
            balance.last_entry_id = Some(entry.id);
            balance.last_entry_at = Some(entry.created_at);
        }

        let mut balances: Vec<AccountBalance> = grouped.into_values().collect();
        balances.sort_by(|a, b| {
            (a.account.to_wire(), a.currency.as_str()).cmp(&(b.account.to_wire(), b.currency.as_str()))
        });
        Ok(balances)
    }

    /// Idempotency probe: has a claim-expense debit already been posted
    /// for this claim?
    pub fn has_claim_been_paid(&self, claim_id: &ClaimId) -> Result<bool, LedgerError> {
        let entries = self
            .store
            .entries_for_reference(claim_id.as_str(), ReferenceType::Claim)?;

        Ok(entries.iter().any(|e| {
            e.account == LedgerAccount::Core(CoreAccount::ExpenseClaims) && e.amount_micros > 0
        }))
    }

    /// The committed transaction for a reference, if any.
    pub fn transaction_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        Ok(self
            .store
            .transaction_for_reference(reference_id, reference_type)?)
    }

    /// Entries carrying a reference, in insertion order.
    pub fn entries_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .store
            .entries_for_reference(reference_id, reference_type)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use capstream_core::CoreAccount;

    use crate::model::NewEntry;
    use crate::store::InMemoryLedgerStore;

    fn engine() -> LedgerEngine<InMemoryLedgerStore> {
        LedgerEngine::new(InMemoryLedgerStore::new())
    }

    fn capture(reference_id: &str, amount_micros: i64) -> NewTransaction {
        NewTransaction {
            description: "payment capture".to_string(),
            currency: Currency::Usd,
            reference_id: reference_id.to_string(),
            reference_type: ReferenceType::PaymentEvent,
            created_by: "test".to_string(),
            entries: vec![
                NewEntry::new(CoreAccount::AssetTreasury, amount_micros, Currency::Usd),
                NewEntry::new(CoreAccount::LiabilityReserve, -amount_micros, Currency::Usd),
            ],
        }
    }

    #[test]
    fn balanced_transaction_commits() {
        let engine = engine();
        let committed = engine.record_transaction(capture("evt_1", 50_000_000)).unwrap();
        assert_eq!(committed.reference_id, "evt_1");

        let balance = engine
            .account_balance(&CoreAccount::AssetTreasury.into(), Currency::Usd)
            .unwrap();
        assert_eq!(balance.balance_micros, 50_000_000);
        assert_eq!(balance.entry_count, 1);
        assert!(balance.last_entry_id.is_some());
    }

    #[test]
    fn imbalanced_transaction_is_rejected() {
        let engine = engine();
        let mut new = capture("evt_1", 100);
        new.entries[1].amount_micros = -90;

        let err = engine.record_transaction(new).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ImbalancedTransaction { sum_micros: 10 }
        ));
    }

    #[test]
    fn single_leg_is_rejected() {
        let engine = engine();
        let mut new = capture("evt_1", 100);
        new.entries.truncate(1);

        let err = engine.record_transaction(new).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientEntries { count: 1 }));
    }

    #[test]
    fn currency_mismatch_is_rejected() {
        let engine = engine();
        let mut new = capture("evt_1", 100);
        new.entries[0].currency = Currency::Eur;

        let err = engine.record_transaction(new).unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
    }

    #[test]
    fn zero_amount_leg_is_rejected() {
        let engine = engine();
        let mut new = capture("evt_1", 100);
        new.entries[0].amount_micros = 0;
        new.entries[1].amount_micros = 0;

        let err = engine.record_transaction(new).unwrap_err();
        assert!(matches!(err, LedgerError::ZeroAmountEntry { .. }));
    }

    #[test]
    fn duplicate_reference_is_a_detected_noop() {
        let engine = engine();
        engine.record_transaction(capture("evt_1", 100)).unwrap();

        let err = engine.record_transaction(capture("evt_1", 100)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReference { .. }));

        // The second submission left no second transaction behind.
        let balance = engine
            .account_balance(&CoreAccount::AssetTreasury.into(), Currency::Usd)
            .unwrap();
        assert_eq!(balance.balance_micros, 100);
        assert_eq!(balance.entry_count, 1);
    }

    #[test]
    fn malformed_wire_account_is_invalid() {
        let err = NewEntry::from_wire("NOT_AN_ACCOUNT", 10, Currency::Usd).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAccount(_)));

        let ok = NewEntry::from_wire("POOL_LIABILITY_pool_x", 10, Currency::Usd).unwrap();
        assert!(matches!(ok.account, LedgerAccount::Pool(_)));
    }

    #[test]
    fn claim_payment_probe() {
        let engine = engine();
        let claim = ClaimId::new("claim_7").unwrap();
        assert!(!engine.has_claim_been_paid(&claim).unwrap());

        let new = NewTransaction {
            description: "claim payout".to_string(),
            currency: Currency::Usd,
            reference_id: claim.as_str().to_string(),
            reference_type: ReferenceType::Claim,
            created_by: "settlement".to_string(),
            entries: vec![
                NewEntry::new(CoreAccount::ExpenseClaims, 5_000_000, Currency::Usd),
                NewEntry::new(
                    capstream_core::PoolId::new("pool_x").unwrap(),
                    -5_000_000,
                    Currency::Usd,
                ),
            ],
        };
        engine.record_transaction(new).unwrap();

        assert!(engine.has_claim_been_paid(&claim).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of balanced captures, the balance of
        /// each account equals the signed sum of its entries, independent
        /// of how postings were batched.
        #[test]
        fn balance_equals_signed_entry_sum(
            amounts in prop::collection::vec(1i64..1_000_000_000i64, 1..20)
        ) {
            let engine = engine();
            let mut expected: i128 = 0;

            for (i, amount) in amounts.iter().enumerate() {
                engine
                    .record_transaction(capture(&format!("evt_{i}"), *amount))
                    .unwrap();
                expected += *amount as i128;
            }

            let treasury = engine
                .account_balance(&CoreAccount::AssetTreasury.into(), Currency::Usd)
                .unwrap();
            let reserve = engine
                .account_balance(&CoreAccount::LiabilityReserve.into(), Currency::Usd)
                .unwrap();

            prop_assert_eq!(treasury.balance_micros, expected);
            prop_assert_eq!(reserve.balance_micros, -expected);

            // The ledger as a whole stays zero-sum.
            let total: i128 = engine
                .all_account_balances()
                .unwrap()
                .iter()
                .map(|b| b.balance_micros)
                .sum();
            prop_assert_eq!(total, 0);
        }
    }
}
