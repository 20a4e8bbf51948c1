use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const FINGERPRINT_LEN: usize = 32;

/// MD5 digest of an encoded payload, used as the settlement lookup key.
///
/// This is an opaque identifier, not an authentication token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digests an encoded payload into 32 lowercase hex characters.
    pub fn of(encoded: &str) -> Self {
        Self(format!("{:x}", md5::compute(encoded.as_bytes())))
    }

    /// Accepts a fingerprint supplied from outside, e.g. by an operator.
    pub fn parse(value: &str) -> Result<Self, PaymentError> {
        let value = value.trim();
        if value.len() == FINGERPRINT_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(PaymentError::Validation(format!(
                "Fingerprint must be {} hex characters",
                FINGERPRINT_LEN
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}
