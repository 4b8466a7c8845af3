use crate::decode::{decode_ascii, decode_model, decode_u32};

use serde::Serialize;

/// Holding registers read once per client to identify the inverter.
pub const IDENTITY_START: u16 = 0;
pub const IDENTITY_LENGTH: u16 = 30;

const FIRMWARE_VERSION: (usize, usize) = (9, 3);
const SERIAL_NUMBER: (usize, usize) = (23, 5);
const MODEL_NUMBER: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub serial_number: String,
    pub firmware_version: String,
    pub model_number: String,
}

impl DeviceIdentity {
    /// Decode holding registers `[0, 30)`. `None` if the reply is short.
    pub fn decode(words: &[u16]) -> Option<Self> {
        let (index, count) = SERIAL_NUMBER;
        let serial_number = decode_ascii(words, index, count)?;
        let (index, count) = FIRMWARE_VERSION;
        let firmware_version = decode_ascii(words, index, count)?;
        let model_number = decode_model(decode_u32(words, MODEL_NUMBER)?);

        Some(Self {
            serial_number,
            firmware_version,
            model_number,
        })
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Serial number: {} Firmware: {} Model Number: {}",
            self.serial_number, self.firmware_version, self.model_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding_registers() -> Vec<u16> {
        let mut words = vec![0u16; IDENTITY_LENGTH as usize];
        // "DH1.0 "
        words[9..12].copy_from_slice(&[0x4448, 0x312E, 0x3020]);
        // "AB12345678"
        words[23..28].copy_from_slice(&[0x4142, 0x3132, 0x3334, 0x3536, 0x3738]);
        words[28..30].copy_from_slice(&[0x0012, 0x3456]);
        words
    }

    #[test]
    fn decodes_identity_fields() {
        let identity = DeviceIdentity::decode(&holding_registers()).unwrap();
        assert_eq!(identity.serial_number, "AB12345678");
        assert_eq!(identity.firmware_version, "DH1.0 ");
        assert_eq!(identity.model_number, "T1 Q2 P3 U4 M5 S6");
    }

    #[test]
    fn short_reply_is_none() {
        assert_eq!(DeviceIdentity::decode(&holding_registers()[..29]), None);
    }
}
