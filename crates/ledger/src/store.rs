//! Append-only ledger persistence.
//!
//! The transaction insert is the only write path that can move money: the
//! transaction header and all entry rows commit as a single atomic unit,
//! and a reader can never observe a partially-posted transaction. The
//! `(reference_id, reference_type)` uniqueness check happens inside the
//! same commit, so the duplicate-reference gate cannot race with the
//! write it guards.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use capstream_core::{Currency, EntryId, LedgerAccount, TransactionId};

use crate::model::{LedgerEntry, LedgerTransaction, ReferenceType};

/// Ledger store operation error.
#[derive(Debug, Clone, Error)]
pub enum LedgerStoreError {
    #[error("reference already used: {reference_id} ({reference_type})")]
    DuplicateReference {
        reference_id: String,
        reference_type: ReferenceType,
    },

    #[error("transaction already exists: {0}")]
    DuplicateTransaction(TransactionId),

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Append-only store for transactions and entries.
///
/// Implementations must commit `insert_transaction` atomically (header
/// plus all entries succeed, or nothing is visible) and must enforce
/// reference uniqueness within that same commit.
pub trait LedgerStore: Send + Sync {
    /// Atomically commit one transaction and its entries.
    fn insert_transaction(
        &self,
        transaction: LedgerTransaction,
        entries: Vec<LedgerEntry>,
    ) -> Result<(), LedgerStoreError>;

    /// All entries for an (account, currency) pair, in insertion order.
    fn entries_for_account(
        &self,
        account: &LedgerAccount,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// All entries carrying a given reference, in insertion order.
    fn entries_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// The committed transaction for a reference, if any.
    fn transaction_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Option<LedgerTransaction>, LedgerStoreError>;

    fn transaction(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, LedgerStoreError>;

    /// Every entry in the ledger, in insertion order.
    fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_transaction(
        &self,
        transaction: LedgerTransaction,
        entries: Vec<LedgerEntry>,
    ) -> Result<(), LedgerStoreError> {
        (**self).insert_transaction(transaction, entries)
    }

    fn entries_for_account(
        &self,
        account: &LedgerAccount,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).entries_for_account(account, currency)
    }

    fn entries_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).entries_for_reference(reference_id, reference_type)
    }

    fn transaction_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Option<LedgerTransaction>, LedgerStoreError> {
        (**self).transaction_for_reference(reference_id, reference_type)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, LedgerStoreError> {
        (**self).transaction(id)
    }

    fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).all_entries()
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    transactions: HashMap<TransactionId, LedgerTransaction>,
    /// Insertion-ordered entry log.
    entries: Vec<LedgerEntry>,
    references: HashMap<(String, ReferenceType), TransactionId>,
    entry_ids: HashSet<EntryId>,
}

/// In-memory append-only ledger store.
///
/// The single write lock spans the whole multi-row commit, which gives
/// the all-or-nothing and no-partial-read guarantees the trait requires.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_transaction(
        &self,
        transaction: LedgerTransaction,
        entries: Vec<LedgerEntry>,
    ) -> Result<(), LedgerStoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        if state.transactions.contains_key(&transaction.id) {
            return Err(LedgerStoreError::DuplicateTransaction(transaction.id));
        }

        let ref_key = (transaction.reference_id.clone(), transaction.reference_type);
        if state.references.contains_key(&ref_key) {
            return Err(LedgerStoreError::DuplicateReference {
                reference_id: transaction.reference_id.clone(),
                reference_type: transaction.reference_type,
            });
        }

        for (idx, entry) in entries.iter().enumerate() {
            if entry.transaction_id != transaction.id {
                return Err(LedgerStoreError::InvalidCommit(format!(
                    "entry {idx} targets a different transaction"
                )));
            }
            if state.entry_ids.contains(&entry.id) {
                return Err(LedgerStoreError::InvalidCommit(format!(
                    "entry id collision at index {idx}"
                )));
            }
        }

        // Past this point nothing can fail: the commit is all-or-nothing.
        state.references.insert(ref_key, transaction.id);
        for entry in entries {
            state.entry_ids.insert(entry.id);
            state.entries.push(entry);
        }
        state.transactions.insert(transaction.id, transaction);

        Ok(())
    }

    fn entries_for_account(
        &self,
        account: &LedgerAccount,
        currency: Currency,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        Ok(state
            .entries
            .iter()
            .filter(|e| &e.account == account && e.currency == currency)
            .cloned()
            .collect())
    }

    fn entries_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        Ok(state
            .entries
            .iter()
            .filter(|e| e.reference_id == reference_id && e.reference_type == reference_type)
            .cloned()
            .collect())
    }

    fn transaction_for_reference(
        &self,
        reference_id: &str,
        reference_type: ReferenceType,
    ) -> Result<Option<LedgerTransaction>, LedgerStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        let id = state
            .references
            .get(&(reference_id.to_string(), reference_type));
        Ok(id.and_then(|id| state.transactions.get(id)).cloned())
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, LedgerStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        Ok(state.transactions.get(&id).cloned())
    }

    fn all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        Ok(state.entries.clone())
    }
}
