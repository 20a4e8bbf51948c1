#![allow(dead_code)]

use khqr_settle::domain::amount::{Amount, Currency};
use khqr_settle::domain::payload::{AccountInfo, QrPayload};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Error;
use std::path::Path;

pub const TIMESTAMP_MS: i64 = 1_771_499_981_397;

/// Individual `acc123` at "Shop", Phnom Penh, 5000 riel.
pub fn shop_payload() -> QrPayload {
    QrPayload::new(
        AccountInfo::individual("acc123"),
        "Shop",
        "Phnom Penh",
        Currency::Khr,
        TIMESTAMP_MS,
    )
    .with_amount(Amount::new(dec!(5000)).unwrap())
}

pub fn settled_body(hash: &str) -> Value {
    json!({
        "responseCode": 0,
        "responseMessage": "Getting transaction successfully.",
        "errorCode": null,
        "data": {
            "hash": hash,
            "fromAccountId": "payer@aclb",
            "toAccountId": "acc123",
            "currency": "KHR",
            "amount": 5000,
        }
    })
}

pub fn error_body(error_code: i64, message: &str) -> Value {
    json!({
        "responseCode": 1,
        "responseMessage": message,
        "errorCode": error_code,
        "data": null,
    })
}

pub fn not_found_body() -> Value {
    error_body(1, "Transaction could not be found. Please check and try again.")
}

pub fn generate_csv(path: &Path, rows: &[[&str; 9]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record([
        "account_id",
        "merchant_name",
        "merchant_city",
        "amount",
        "currency",
        "merchant_id",
        "acquiring_bank",
        "bill_number",
        "description",
    ])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
