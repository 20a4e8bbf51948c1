//! Tag-length-value encoding of KHQR payment codes.
//!
//! Every element is a 2-digit tag, a 2-digit decimal length and the value.
//! Top-level fields are written in the order scanners expect, which is not
//! numeric order, and the frame always ends with the `63` checksum field.

use super::crc;
use super::payload::{AccountInfo, AdditionalData, QrPayload};
use crate::error::{PaymentError, Result};
use std::collections::BTreeMap;

/// Top-level tags.
pub mod tag {
    pub const PAYLOAD_FORMAT: &str = "00";
    pub const POINT_OF_INITIATION: &str = "01";
    pub const INDIVIDUAL_ACCOUNT: &str = "29";
    pub const MERCHANT_ACCOUNT: &str = "30";
    pub const MERCHANT_CATEGORY_CODE: &str = "52";
    pub const CURRENCY: &str = "53";
    pub const AMOUNT: &str = "54";
    pub const COUNTRY_CODE: &str = "58";
    pub const MERCHANT_NAME: &str = "59";
    pub const MERCHANT_CITY: &str = "60";
    pub const ADDITIONAL_DATA: &str = "62";
    pub const CRC: &str = "63";
    pub const TIMESTAMP: &str = "99";
}

/// Sub-tags inside the `29` / `30` account blocks.
pub mod account_tag {
    pub const ACCOUNT_ID: &str = "00";
    /// Individual only.
    pub const ACCOUNT_INFORMATION: &str = "01";
    /// Merchant only.
    pub const MERCHANT_ID: &str = "01";
    pub const ACQUIRING_BANK: &str = "02";
}

/// Sub-tags inside the `62` additional data block.
pub mod additional_tag {
    pub const BILL_NUMBER: &str = "01";
    pub const MOBILE_NUMBER: &str = "02";
    pub const STORE_LABEL: &str = "03";
    pub const TERMINAL_LABEL: &str = "07";
    pub const PURPOSE: &str = "08";
}

/// Sub-tag inside the `99` timestamp block.
pub const TIMESTAMP_MILLIS: &str = "00";

pub const PAYLOAD_FORMAT_VERSION: &str = "01";

const MAX_VALUE_LEN: usize = 99;
const HEADER_LEN: usize = 4;
/// `63` + `04` + 4 hex digits.
const CRC_FIELD_LEN: usize = 8;
const CRC_FIELD_HEADER: &str = "6304";
const FRAME_PREFIX: &str = "000201";
const MIN_FRAME_LEN: usize = FRAME_PREFIX.len() + CRC_FIELD_LEN;

/// Appends one TLV element. Values must be ASCII and at most 99 bytes.
fn push_field(out: &mut String, tag: &str, value: &str) -> Result<()> {
    if !value.is_ascii() {
        return Err(PaymentError::Validation(format!(
            "Field {} must contain only ASCII characters",
            tag
        )));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(PaymentError::Validation(format!(
            "Field {} is {} characters long, the limit is {}",
            tag,
            value.len(),
            MAX_VALUE_LEN
        )));
    }
    out.push_str(tag);
    out.push_str(&format!("{:02}", value.len()));
    out.push_str(value);
    Ok(())
}

/// Appends the element only when a non-empty value is present.
fn push_optional(out: &mut String, tag: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) if !value.is_empty() => push_field(out, tag, value),
        _ => Ok(()),
    }
}

fn account_block(account: &AccountInfo) -> Result<String> {
    let mut content = String::new();
    push_field(&mut content, account_tag::ACCOUNT_ID, account.account_id())?;
    match account {
        AccountInfo::Individual(individual) => {
            push_optional(
                &mut content,
                account_tag::ACCOUNT_INFORMATION,
                individual.account_information.as_deref(),
            )?;
            push_optional(
                &mut content,
                account_tag::ACQUIRING_BANK,
                individual.acquiring_bank.as_deref(),
            )?;
        }
        AccountInfo::Merchant(merchant) => {
            push_field(&mut content, account_tag::MERCHANT_ID, &merchant.merchant_id)?;
            push_field(
                &mut content,
                account_tag::ACQUIRING_BANK,
                &merchant.acquiring_bank,
            )?;
        }
    }
    Ok(content)
}

fn additional_data_block(data: &AdditionalData) -> Result<String> {
    let mut content = String::new();
    push_optional(&mut content, additional_tag::BILL_NUMBER, data.bill_number.as_deref())?;
    push_optional(&mut content, additional_tag::MOBILE_NUMBER, data.mobile_number.as_deref())?;
    push_optional(&mut content, additional_tag::STORE_LABEL, data.store_label.as_deref())?;
    push_optional(&mut content, additional_tag::TERMINAL_LABEL, data.terminal_label.as_deref())?;
    push_optional(&mut content, additional_tag::PURPOSE, data.purpose.as_deref())?;
    Ok(content)
}

/// Checksum over `body` followed by the zero-filled checksum field.
fn checksum_for(body: &str) -> String {
    let mut framed = String::with_capacity(body.len() + CRC_FIELD_LEN);
    framed.push_str(body);
    framed.push_str(CRC_FIELD_HEADER);
    framed.push_str("0000");
    crc::to_hex(crc::checksum(framed.as_bytes()))
}

/// Serialises a payload into its TLV string, checksum included.
pub fn encode(payload: &QrPayload) -> Result<String> {
    payload.validate()?;

    let mut qr = String::new();
    push_field(&mut qr, tag::PAYLOAD_FORMAT, PAYLOAD_FORMAT_VERSION)?;
    push_field(&mut qr, tag::POINT_OF_INITIATION, payload.initiation_method().code())?;
    push_field(&mut qr, payload.account.tag(), &account_block(&payload.account)?)?;
    push_field(&mut qr, tag::MERCHANT_CATEGORY_CODE, &payload.merchant_category_code)?;
    push_field(&mut qr, tag::CURRENCY, payload.currency.numeric_code())?;
    push_optional(&mut qr, tag::AMOUNT, payload.formatted_amount().as_deref())?;
    push_field(&mut qr, tag::COUNTRY_CODE, &payload.country_code)?;
    push_field(&mut qr, tag::MERCHANT_NAME, &payload.merchant_name)?;
    push_field(&mut qr, tag::MERCHANT_CITY, &payload.merchant_city)?;
    if !payload.additional_data.is_empty() {
        let additional = additional_data_block(&payload.additional_data)?;
        push_field(&mut qr, tag::ADDITIONAL_DATA, &additional)?;
    }
    let mut timestamp = String::new();
    push_field(&mut timestamp, TIMESTAMP_MILLIS, &payload.timestamp_ms.to_string())?;
    push_field(&mut qr, tag::TIMESTAMP, &timestamp)?;

    let checksum = checksum_for(&qr);
    push_field(&mut qr, tag::CRC, &checksum)?;
    Ok(qr)
}

/// Structural parse into a tag → value map.
///
/// Stops after the checksum field, or at the end of input for nested block
/// contents. Field contents are not interpreted.
pub fn decode(encoded: &str) -> Result<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    let mut pos = 0;

    while pos < encoded.len() {
        let (id, len) = match (encoded.get(pos..pos + 2), encoded.get(pos + 2..pos + HEADER_LEN)) {
            (Some(id), Some(len)) => (id, len),
            _ => return Err(PaymentError::decode(pos, "truncated field header")),
        };
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::decode(pos, format!("non-numeric tag {:?}", id)));
        }
        if !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::decode(
                pos + 2,
                format!("non-numeric length {:?}", len),
            ));
        }
        let len: usize = len
            .parse()
            .map_err(|_| PaymentError::decode(pos + 2, "unreadable length"))?;

        let start = pos + HEADER_LEN;
        let value = encoded.get(start..start + len).ok_or_else(|| {
            PaymentError::decode(start, format!("field {} runs past the end of input", id))
        })?;
        fields.insert(id.to_string(), value.to_string());
        pos = start + len;

        if id == tag::CRC {
            break;
        }
    }

    Ok(fields)
}

/// Recomputes the checksum and compares it with the embedded one.
///
/// Never fails: anything that is not a well-formed frame is simply invalid.
pub fn verify(encoded: &str) -> bool {
    if encoded.len() < MIN_FRAME_LEN || !encoded.starts_with(FRAME_PREFIX) {
        return false;
    }
    let split = encoded.len() - CRC_FIELD_LEN;
    let (Some(body), Some(crc_field)) = (encoded.get(..split), encoded.get(split..)) else {
        return false;
    };
    match crc_field.strip_prefix(CRC_FIELD_HEADER) {
        Some(provided) => checksum_for(body) == provided,
        None => false,
    }
}
