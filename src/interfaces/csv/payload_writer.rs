use crate::domain::payload::EncodedPayload;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct PayloadRecord<'a> {
    account_id: &'a str,
    fingerprint: &'a str,
    qr: &'a str,
}

/// Writes generated codes as `account_id,fingerprint,qr` rows.
pub struct PayloadWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PayloadWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payload(&mut self, account_id: &str, payload: &EncodedPayload) -> Result<()> {
        self.writer.serialize(PayloadRecord {
            account_id,
            fingerprint: payload.fingerprint().as_str(),
            qr: payload.as_str(),
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::Currency;
    use crate::domain::payload::{AccountInfo, QrPayload};

    #[test]
    fn test_writes_header_and_rows() {
        let payload = QrPayload::new(
            AccountInfo::individual("acc123"),
            "Shop",
            "Phnom Penh",
            Currency::Khr,
            1_771_499_981_397,
        );
        let encoded = EncodedPayload::encode(&payload).unwrap();

        let mut out = Vec::new();
        {
            let mut writer = PayloadWriter::new(&mut out);
            writer.write_payload("acc123", &encoded).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("account_id,fingerprint,qr"));
        assert_eq!(
            lines.next().map(str::to_string),
            Some(format!("acc123,{},{}", encoded.fingerprint(), encoded.as_str()))
        );
    }
}
