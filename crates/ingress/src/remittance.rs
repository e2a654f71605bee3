//! Remittance ingress.
//!
//! Authorized source systems (premium collections, reinsurance
//! recoveries, capital partners) submit pool-scoped credits. A request
//! is fully validated before it reaches the engines: source allowlist,
//! pool-id naming convention, positive amount, supported currency, and
//! pool/currency agreement.

use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use capstream_core::{CoreAccount, Currency, PoolId};
use capstream_ledger::{
    LedgerEngine, LedgerError, LedgerStore, NewEntry, NewTransaction, ReferenceType,
};
use capstream_treasury::{TreasuryEngine, TreasuryError, TreasuryStore};

use crate::response::{IngressError, IngressResponse};

/// Source systems allowed to submit remittances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceSource {
    PremiumCollections,
    ReinsuranceRecovery,
    CapitalPartner,
}

impl FromStr for RemittanceSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium_collections" => Ok(RemittanceSource::PremiumCollections),
            "reinsurance_recovery" => Ok(RemittanceSource::ReinsuranceRecovery),
            "capital_partner" => Ok(RemittanceSource::CapitalPartner),
            _ => Err(()),
        }
    }
}

/// Remittance submission in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemittanceRequest {
    pub source: String,
    /// Source system's reference; the idempotency handle.
    pub reference_id: String,
    pub pool_id: String,
    pub amount_micros: i64,
    pub currency: String,
    pub memo: Option<String>,
}

/// Validates remittances, posts them to the ledger and credits the pool.
#[derive(Debug)]
pub struct RemittanceHandler<LS: LedgerStore, TS: TreasuryStore> {
    ledger: Arc<LedgerEngine<LS>>,
    treasury: Arc<TreasuryEngine<TS>>,
}

impl<LS: LedgerStore, TS: TreasuryStore> RemittanceHandler<LS, TS> {
    pub fn new(ledger: Arc<LedgerEngine<LS>>, treasury: Arc<TreasuryEngine<TS>>) -> Self {
        Self { ledger, treasury }
    }

    pub fn process(&self, request: &RemittanceRequest) -> Result<IngressResponse, IngressError> {
        let Ok(source) = request.source.parse::<RemittanceSource>() else {
            return Ok(IngressResponse::rejected(
                "unauthorized_source",
                format!("source not authorized for remittance: {}", request.source),
            ));
        };
        let pool_id = match PoolId::new(request.pool_id.as_str()) {
            Ok(pool_id) => pool_id,
            Err(err) => {
                return Ok(IngressResponse::rejected("invalid_pool_id", err.to_string()));
            }
        };
        if request.reference_id.is_empty() {
            return Ok(IngressResponse::rejected(
                "invalid_reference",
                "reference id must not be empty",
            ));
        }
        if request.amount_micros <= 0 {
            return Ok(IngressResponse::rejected(
                "invalid_amount",
                format!("amount must be positive, got {}", request.amount_micros),
            ));
        }
        let currency: Currency = match request.currency.parse() {
            Ok(currency) => currency,
            Err(_) => {
                return Ok(IngressResponse::rejected(
                    "unsupported_currency",
                    format!("unsupported currency: {}", request.currency),
                ));
            }
        };

        let pool = match self.treasury.pool(&pool_id) {
            Ok(pool) => pool,
            Err(TreasuryError::PoolNotFound(_)) => {
                return Ok(IngressResponse::rejected(
                    "unknown_pool",
                    format!("pool does not exist: {pool_id}"),
                ));
            }
            Err(err) => return Err(IngressError::Storage(err.to_string())),
        };
        if pool.currency != currency {
            return Ok(IngressResponse::rejected(
                "currency_mismatch",
                format!(
                    "pool {} is denominated in {}, got {}",
                    pool_id, pool.currency, currency
                ),
            ));
        }

        let mut debit = NewEntry::new(CoreAccount::AssetTreasury, request.amount_micros, currency);
        let mut credit = NewEntry::new(pool_id.clone(), -request.amount_micros, currency);
        if let Some(memo) = &request.memo {
            debit = debit.with_memo(memo.clone());
            credit = credit.with_memo(memo.clone());
        }

        let result = self.ledger.record_transaction(NewTransaction {
            description: format!("remittance from {source:?} to {pool_id}"),
            currency,
            reference_id: request.reference_id.clone(),
            reference_type: ReferenceType::Remittance,
            created_by: "remittance-ingress".to_string(),
            entries: vec![debit, credit],
        });

        let transaction = match result {
            Ok(transaction) => transaction,
            Err(LedgerError::DuplicateReference { reference_id, .. }) => {
                info!(reference_id = %reference_id, "duplicate remittance ignored");
                return Ok(IngressResponse::Duplicate { reference_id });
            }
            Err(LedgerError::Storage(msg)) => return Err(IngressError::Storage(msg)),
            Err(other) => {
                return Ok(IngressResponse::rejected(
                    "invalid_transaction",
                    other.to_string(),
                ));
            }
        };

        // Keep the pool's cached balance in step with its ledger sums.
        if let Err(err) = self.treasury.credit_pool(&pool_id, request.amount_micros) {
            warn!(
                pool_id = %pool_id,
                transaction_id = %transaction.id,
                error = %err,
                "remittance posted to ledger but pool credit failed"
            );
            return Err(IngressError::Storage(err.to_string()));
        }

        info!(
            transaction_id = %transaction.id,
            pool_id = %pool_id,
            amount = request.amount_micros,
            "remittance accepted"
        );
        Ok(IngressResponse::Accepted {
            transaction_id: transaction.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstream_ledger::InMemoryLedgerStore;
    use capstream_treasury::{InMemoryTreasuryStore, NewPool};

    type Handler = RemittanceHandler<InMemoryLedgerStore, InMemoryTreasuryStore>;

    fn setup() -> (
        Arc<LedgerEngine<InMemoryLedgerStore>>,
        Arc<TreasuryEngine<InMemoryTreasuryStore>>,
        Handler,
    ) {
        let ledger = Arc::new(LedgerEngine::new(InMemoryLedgerStore::new()));
        let treasury = Arc::new(TreasuryEngine::new(InMemoryTreasuryStore::new()));
        treasury
            .create_pool(NewPool {
                id: PoolId::new("pool_x").unwrap(),
                name: "Claims reserve USD".to_string(),
                currency: Currency::Usd,
                initial_balance_micros: 0,
                minimum_reserve_micros: 200_000,
            })
            .unwrap();
        let handler = RemittanceHandler::new(ledger.clone(), treasury.clone());
        (ledger, treasury, handler)
    }

    fn request(reference_id: &str, amount_micros: i64) -> RemittanceRequest {
        RemittanceRequest {
            source: "premium_collections".to_string(),
            reference_id: reference_id.to_string(),
            pool_id: "pool_x".to_string(),
            amount_micros,
            currency: "USD".to_string(),
            memo: None,
        }
    }

    #[test]
    fn remittance_credits_pool_and_ledger_together() {
        let (ledger, treasury, handler) = setup();

        let response = handler.process(&request("rem_1", 1_000_000)).unwrap();
        assert!(matches!(response, IngressResponse::Accepted { .. }));

        let pool_id = PoolId::new("pool_x").unwrap();
        assert_eq!(treasury.pool(&pool_id).unwrap().balance_micros, 1_000_000);

        let liability = ledger
            .account_balance(&pool_id.into(), Currency::Usd)
            .unwrap();
        assert_eq!(liability.balance_micros, -1_000_000);
    }

    #[test]
    fn duplicate_remittance_does_not_double_credit() {
        let (_ledger, treasury, handler) = setup();

        handler.process(&request("rem_1", 1_000_000)).unwrap();
        let response = handler.process(&request("rem_1", 1_000_000)).unwrap();
        assert!(matches!(response, IngressResponse::Duplicate { .. }));

        let pool_id = PoolId::new("pool_x").unwrap();
        assert_eq!(treasury.pool(&pool_id).unwrap().balance_micros, 1_000_000);
    }

    #[test]
    fn unauthorized_source_is_rejected() {
        let (_ledger, _treasury, handler) = setup();

        let mut bad = request("rem_1", 1_000_000);
        bad.source = "unknown_partner".to_string();
        let IngressResponse::Rejected { code, .. } = handler.process(&bad).unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(code, "unauthorized_source");
    }

    #[test]
    fn validation_happens_before_any_posting() {
        let (ledger, _treasury, handler) = setup();

        let mut bad = request("rem_1", 1_000_000);
        bad.pool_id = "POOLX".to_string();
        let IngressResponse::Rejected { code, .. } = handler.process(&bad).unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(code, "invalid_pool_id");

        let mut bad = request("rem_2", 0);
        bad.amount_micros = 0;
        let IngressResponse::Rejected { code, .. } = handler.process(&bad).unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(code, "invalid_amount");

        let mut bad = request("rem_3", 500);
        bad.currency = "CHF".to_string();
        let IngressResponse::Rejected { code, .. } = handler.process(&bad).unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(code, "unsupported_currency");

        let mut bad = request("rem_4", 500);
        bad.pool_id = "pool_missing".to_string();
        let IngressResponse::Rejected { code, .. } = handler.process(&bad).unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(code, "unknown_pool");

        // None of the rejected submissions left entries behind.
        let treasury_balance = ledger
            .account_balance(&CoreAccount::AssetTreasury.into(), Currency::Usd)
            .unwrap();
        assert_eq!(treasury_balance.entry_count, 0);
    }
}
