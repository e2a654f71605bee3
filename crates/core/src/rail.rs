//! Payment rails a payout can travel over.
//!
//! Rail-specific execution is a black box behind the payout execution
//! boundary; the core only carries the tag.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutRail {
    BankTransfer,
    CardNetwork,
    StablecoinRail,
}

impl PayoutRail {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutRail::BankTransfer => "bank_transfer",
            PayoutRail::CardNetwork => "card_network",
            PayoutRail::StablecoinRail => "stablecoin_rail",
        }
    }
}

impl core::fmt::Display for PayoutRail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutRail {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PayoutRail::BankTransfer),
            "card_network" => Ok(PayoutRail::CardNetwork),
            "stablecoin_rail" => Ok(PayoutRail::StablecoinRail),
            other => Err(DomainError::validation(format!(
                "unsupported payout rail: {other}"
            ))),
        }
    }
}
