//! Micro-unit money representation.
//!
//! The ledger's only numeric representation is a signed integer count of
//! micro-units (1 currency unit = 1,000,000 micros). Floating point never
//! enters a balance computation; the display helpers below exist for
//! presentation boundaries only and are lossy by design.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Micros per major currency unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Currencies supported by the settlement core.
///
/// A fixed set; there is no FX conversion anywhere in the system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            other => Err(DomainError::validation(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

/// Convert a display amount (major units) to micros, rounding half away
/// from zero. Presentation-boundary use only; the result must not be
/// round-tripped back out of the ledger.
pub fn micros_from_display(units: f64) -> i64 {
    (units * MICROS_PER_UNIT as f64).round() as i64
}

/// Render micros as a major-unit string with two decimal places,
/// rounding half up on the magnitude. Lossy; presentation only.
pub fn micros_to_display_string(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let magnitude = (micros as i128).unsigned_abs();
    // Round micros to cents.
    let cents = (magnitude * 100 + (MICROS_PER_UNIT as u128) / 2) / MICROS_PER_UNIT as u128;
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}
