use crate::domain::amount::{Amount, Currency};
use crate::domain::payload::{AccountInfo, AdditionalData, IndividualAccount, QrPayload};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of a batch generation file.
///
/// A row with a `merchant_id` describes a merchant account; without one it is
/// an individual account. An empty `amount` yields a static code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentRow {
    pub account_id: String,
    pub merchant_name: String,
    #[serde(default)]
    pub merchant_city: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub acquiring_bank: Option<String>,
    #[serde(default)]
    pub bill_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PaymentRow {
    /// Builds the payload for this row, stamped with `timestamp_ms`.
    pub fn to_payload(&self, default_city: &str, timestamp_ms: i64) -> Result<QrPayload> {
        let account = match non_empty(&self.merchant_id) {
            Some(merchant_id) => AccountInfo::merchant(
                &self.account_id,
                merchant_id,
                non_empty(&self.acquiring_bank).unwrap_or_default(),
            ),
            None => AccountInfo::Individual(IndividualAccount {
                account_id: self.account_id.clone(),
                account_information: None,
                acquiring_bank: non_empty(&self.acquiring_bank).map(str::to_string),
            }),
        };
        let currency: Currency = self.currency.parse()?;
        let city = non_empty(&self.merchant_city).unwrap_or(default_city);

        let mut payload = QrPayload::new(account, &self.merchant_name, city, currency, timestamp_ms)
            .with_additional_data(AdditionalData {
                bill_number: non_empty(&self.bill_number).map(str::to_string),
                purpose: non_empty(&self.description).map(str::to_string),
                ..Default::default()
            });
        if let Some(amount) = non_empty(&self.amount) {
            payload = payload.with_amount(amount.parse::<Amount>()?);
        }
        Ok(payload)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Streams payment requests from a headed CSV file, one code per row.
///
/// Cells are trimmed and trailing optional columns may be left off, so a
/// sheet with only `account_id,merchant_name,currency` still parses.
pub struct PaymentRequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentRequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// A malformed row yields an error in place; later rows are still read.
    pub fn rows(self) -> impl Iterator<Item = Result<PaymentRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
