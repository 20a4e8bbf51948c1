//! Domain layer: the payment-code wire format and the transaction model.
//!
//! Everything here except the port traits is pure and synchronous.

pub mod amount;
pub mod crc;
pub mod fingerprint;
pub mod payload;
pub mod ports;
pub mod tlv;
pub mod transaction;
