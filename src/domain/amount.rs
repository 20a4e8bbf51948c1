use crate::error::PaymentError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies a payload can be denominated in.
///
/// The numeric code is what goes on the wire (tag `53`); the symbol is what
/// callers and the transaction store use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Cambodian riel, integer-denominated.
    Khr,
    /// US dollar, two decimal places.
    Usd,
}

impl Currency {
    /// ISO 4217 numeric code.
    pub fn numeric_code(&self) -> &'static str {
        match self {
            Currency::Khr => "116",
            Currency::Usd => "840",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Khr => "KHR",
            Currency::Usd => "USD",
        }
    }

    /// Number of decimal places the wire format carries for this currency.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Khr => 0,
            Currency::Usd => 2,
        }
    }

    /// Formats an amount for tag `54`.
    ///
    /// Integer currencies are rounded to a whole number with no separator,
    /// decimal currencies always carry exactly two places.
    pub fn format_amount(&self, amount: Amount) -> String {
        self.round_amount(amount).to_string()
    }

    /// Rounds an amount to this currency's minor units, half away from zero.
    pub fn round_amount(&self, amount: Amount) -> Decimal {
        let dp = self.minor_units();
        let mut value = amount
            .value()
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
        value.rescale(dp);
        value
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KHR" | "116" => Ok(Currency::Khr),
            "USD" | "840" => Ok(Currency::Usd),
            other => Err(PaymentError::Validation(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

/// Represents a positive monetary amount for a payment code.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| PaymentError::Validation(format!("Invalid amount {:?}: {}", s, e)))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
