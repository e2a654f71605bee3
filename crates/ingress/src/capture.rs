//! Payment-capture ingress.
//!
//! A payment provider (card network, PSP) reports a successful capture.
//! The provider's event id becomes the ledger reference, so webhook
//! redelivery collapses into the duplicate-reference check.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use capstream_core::{CoreAccount, Currency, micros_to_display_string};
use capstream_ledger::{
    LedgerEngine, LedgerError, LedgerStore, NewEntry, NewTransaction, ReferenceType,
};

use crate::response::{IngressError, IngressResponse};

/// Capture notification in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentCaptureNotice {
    /// Provider event id, e.g. a Stripe event id.
    pub provider_event_id: String,
    pub amount_micros: i64,
    pub currency: String,
    pub memo: Option<String>,
}

/// Validates capture notices and posts them to the ledger.
#[derive(Debug)]
pub struct CaptureHandler<S: LedgerStore> {
    ledger: Arc<LedgerEngine<S>>,
    created_by: String,
}

impl<S: LedgerStore> CaptureHandler<S> {
    pub fn new(ledger: Arc<LedgerEngine<S>>) -> Self {
        Self {
            ledger,
            created_by: "payment-capture-ingress".to_string(),
        }
    }

    pub fn process(
        &self,
        notice: &PaymentCaptureNotice,
    ) -> Result<IngressResponse, IngressError> {
        if notice.provider_event_id.is_empty() || notice.provider_event_id.len() > 255 {
            return Ok(IngressResponse::rejected(
                "invalid_event_id",
                "provider event id must be 1..=255 characters",
            ));
        }
        if notice.amount_micros <= 0 {
            return Ok(IngressResponse::rejected(
                "invalid_amount",
                format!("amount must be positive, got {}", notice.amount_micros),
            ));
        }
        let currency: Currency = match notice.currency.parse() {
            Ok(currency) => currency,
            Err(_) => {
                return Ok(IngressResponse::rejected(
                    "unsupported_currency",
                    format!("unsupported currency: {}", notice.currency),
                ));
            }
        };

        let mut credit = NewEntry::new(
            CoreAccount::LiabilityReserve,
            -notice.amount_micros,
            currency,
        );
        let mut debit = NewEntry::new(CoreAccount::AssetTreasury, notice.amount_micros, currency);
        if let Some(memo) = &notice.memo {
            debit = debit.with_memo(memo.clone());
            credit = credit.with_memo(memo.clone());
        }

        let result = self.ledger.record_transaction(NewTransaction {
            description: "payment capture".to_string(),
            currency,
            reference_id: notice.provider_event_id.clone(),
            reference_type: ReferenceType::PaymentEvent,
            created_by: self.created_by.clone(),
            entries: vec![debit, credit],
        });

        match result {
            Ok(transaction) => {
                info!(
                    transaction_id = %transaction.id,
                    provider_event_id = %notice.provider_event_id,
                    amount = %micros_to_display_string(notice.amount_micros),
                    currency = %currency,
                    "payment capture posted"
                );
                Ok(IngressResponse::Accepted {
                    transaction_id: transaction.id,
                })
            }
            Err(LedgerError::DuplicateReference { reference_id, .. }) => {
                info!(provider_event_id = %reference_id, "duplicate capture delivery ignored");
                Ok(IngressResponse::Duplicate { reference_id })
            }
            Err(LedgerError::Storage(msg)) => Err(IngressError::Storage(msg)),
            Err(other) => Ok(IngressResponse::rejected(
                "invalid_transaction",
                other.to_string(),
            )),
        }
    }
}
