//! CRC-16/CCITT-FALSE, the checksum carried in the trailing `63` field.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Computes the checksum over raw bytes, MSB first, without reflection or final XOR.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |crc, &byte| {
        let mut crc = crc ^ (u16::from(byte) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Renders a checksum the way it is embedded in a payload: 4 uppercase hex digits.
pub fn to_hex(crc: u16) -> String {
    format!("{:04X}", crc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Standard CRC-16/CCITT-FALSE check input.
        assert_eq!(checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_initial_register() {
        assert_eq!(checksum(b""), 0xFFFF);
    }

    #[test]
    fn test_hex_is_zero_padded_uppercase() {
        assert_eq!(to_hex(0x0A1F), "0A1F");
        assert_eq!(to_hex(0xBEEF), "BEEF");
        assert_eq!(to_hex(0), "0000");
    }

    #[test]
    fn test_single_byte_change_detected() {
        let original = checksum(b"00020101021229");
        let altered = checksum(b"00020101021129");
        assert_ne!(original, altered);
    }
}
