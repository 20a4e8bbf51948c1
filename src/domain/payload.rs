use super::amount::{Amount, Currency};
use super::fingerprint::Fingerprint;
use super::tlv;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MERCHANT_CATEGORY_CODE: &str = "5999";
pub const DEFAULT_COUNTRY_CODE: &str = "KH";

/// A personal account. Only the account id is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualAccount {
    pub account_id: String,
    /// Phone number or bank account alias.
    pub account_information: Option<String>,
    pub acquiring_bank: Option<String>,
}

/// A registered merchant. Every field is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantAccount {
    pub account_id: String,
    pub merchant_id: String,
    pub acquiring_bank: String,
}

/// The account block of a payload.
///
/// Both variants share sub-tag `00` for the account id, but each is wrapped in
/// its own top-level tag and has its own required fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AccountInfo {
    Individual(IndividualAccount),
    Merchant(MerchantAccount),
}

impl AccountInfo {
    pub fn individual(account_id: impl Into<String>) -> Self {
        AccountInfo::Individual(IndividualAccount {
            account_id: account_id.into(),
            account_information: None,
            acquiring_bank: None,
        })
    }

    pub fn merchant(
        account_id: impl Into<String>,
        merchant_id: impl Into<String>,
        acquiring_bank: impl Into<String>,
    ) -> Self {
        AccountInfo::Merchant(MerchantAccount {
            account_id: account_id.into(),
            merchant_id: merchant_id.into(),
            acquiring_bank: acquiring_bank.into(),
        })
    }

    pub fn account_id(&self) -> &str {
        match self {
            AccountInfo::Individual(account) => &account.account_id,
            AccountInfo::Merchant(account) => &account.account_id,
        }
    }

    /// Top-level tag wrapping this variant's sub-fields.
    pub fn tag(&self) -> &'static str {
        match self {
            AccountInfo::Individual(_) => tlv::tag::INDIVIDUAL_ACCOUNT,
            AccountInfo::Merchant(_) => tlv::tag::MERCHANT_ACCOUNT,
        }
    }

    fn validate(&self) -> Result<()> {
        require("account id", self.account_id())?;
        if let AccountInfo::Merchant(account) = self {
            require("merchant id", &account.merchant_id)?;
            require("acquiring bank", &account.acquiring_bank)?;
        }
        Ok(())
    }
}

/// Optional tag `62` contents. Absent and empty entries are both left out of the encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalData {
    pub bill_number: Option<String>,
    pub mobile_number: Option<String>,
    pub store_label: Option<String>,
    pub terminal_label: Option<String>,
    pub purpose: Option<String>,
}

impl AdditionalData {
    pub fn is_empty(&self) -> bool {
        [
            &self.bill_number,
            &self.mobile_number,
            &self.store_label,
            &self.terminal_label,
            &self.purpose,
        ]
        .iter()
        .all(|value| value.as_deref().is_none_or(str::is_empty))
    }
}

/// Point of initiation marker (tag `01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiationMethod {
    /// Reusable code, the payer enters the amount.
    Static,
    /// Single-use code carrying an amount.
    Dynamic,
}

impl InitiationMethod {
    pub fn code(&self) -> &'static str {
        match self {
            InitiationMethod::Static => "11",
            InitiationMethod::Dynamic => "12",
        }
    }
}

/// Everything needed to build one payment code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub account: AccountInfo,
    pub merchant_category_code: String,
    pub currency: Currency,
    pub amount: Option<Amount>,
    pub country_code: String,
    pub merchant_name: String,
    pub merchant_city: String,
    pub additional_data: AdditionalData,
    /// Milliseconds since the Unix epoch, carried in tag `99`.
    pub timestamp_ms: i64,
}

impl QrPayload {
    pub fn new(
        account: AccountInfo,
        merchant_name: impl Into<String>,
        merchant_city: impl Into<String>,
        currency: Currency,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            account,
            merchant_category_code: DEFAULT_MERCHANT_CATEGORY_CODE.to_string(),
            currency,
            amount: None,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            merchant_name: merchant_name.into(),
            merchant_city: merchant_city.into(),
            additional_data: AdditionalData::default(),
            timestamp_ms,
        }
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_additional_data(mut self, additional_data: AdditionalData) -> Self {
        self.additional_data = additional_data;
        self
    }

    pub fn with_merchant_category_code(mut self, code: impl Into<String>) -> Self {
        self.merchant_category_code = code.into();
        self
    }

    /// A payload with an amount is always dynamic.
    pub fn initiation_method(&self) -> InitiationMethod {
        if self.amount.is_some() {
            InitiationMethod::Dynamic
        } else {
            InitiationMethod::Static
        }
    }

    pub fn formatted_amount(&self) -> Option<String> {
        self.amount.map(|amount| self.currency.format_amount(amount))
    }

    /// Checks required fields. Length limits are enforced while encoding.
    pub fn validate(&self) -> Result<()> {
        self.account.validate()?;
        require("merchant name", &self.merchant_name)?;
        require("merchant city", &self.merchant_city)?;
        require("merchant category code", &self.merchant_category_code)?;
        require("country code", &self.country_code)?;
        if let Some(amount) = self.amount
            && self.currency.round_amount(amount).is_zero()
        {
            return Err(PaymentError::Validation(format!(
                "Amount {} rounds to zero in {}",
                amount.value(),
                self.currency
            )));
        }
        if self.timestamp_ms < 0 {
            return Err(PaymentError::Validation(
                "Timestamp must not precede the epoch".to_string(),
            ));
        }
        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(PaymentError::Validation(format!("{} is required", name)))
    } else {
        Ok(())
    }
}

/// A finished payment code and the fingerprint derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedPayload {
    qr: String,
    fingerprint: Fingerprint,
}

impl EncodedPayload {
    pub fn encode(payload: &QrPayload) -> Result<Self> {
        let qr = tlv::encode(payload)?;
        let fingerprint = Fingerprint::of(&qr);
        Ok(Self { qr, fingerprint })
    }

    pub fn as_str(&self) -> &str {
        &self.qr
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The 4 hex digits of the trailing checksum field.
    pub fn checksum(&self) -> &str {
        &self.qr[self.qr.len() - 4..]
    }

    pub fn into_parts(self) -> (String, Fingerprint) {
        (self.qr, self.fingerprint)
    }
}
