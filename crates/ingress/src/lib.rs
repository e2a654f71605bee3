//! Ingress boundaries: payment capture and remittance intake.
//!
//! The HTTP transport lives outside this crate; ingress is specified at
//! the validation boundary. Requests arrive in wire form (string
//! identifiers, raw amounts), are validated here, and only then reach
//! the engines. Responses are structured bodies with webhook status
//! semantics: accepted, duplicate (safe no-op) or rejected with a code.

pub mod capture;
pub mod remittance;
pub mod response;

pub use capture::{CaptureHandler, PaymentCaptureNotice};
pub use remittance::{RemittanceHandler, RemittanceRequest, RemittanceSource};
pub use response::{IngressError, IngressResponse};
