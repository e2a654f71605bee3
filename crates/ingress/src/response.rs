use serde::Serialize;
use thiserror::Error;

use capstream_core::TransactionId;

/// Structured ingress outcome, serialized as a webhook response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngressResponse {
    /// Validated and posted.
    Accepted { transaction_id: TransactionId },
    /// Already processed earlier; this submission was a safe no-op.
    Duplicate { reference_id: String },
    /// Failed validation; nothing was persisted.
    Rejected { code: String, error: String },
}

impl IngressResponse {
    pub fn rejected(code: &str, error: impl Into<String>) -> Self {
        IngressResponse::Rejected {
            code: code.to_string(),
            error: error.into(),
        }
    }
}

/// Transient ingress failure. Business rejections are responses, not
/// errors; this surfaces only infrastructure faults the caller should
/// retry.
#[derive(Debug, Clone, Error)]
pub enum IngressError {
    #[error("storage error: {0}")]
    Storage(String),
}
