use std::time::Instant;

use crate::device::constants::{
    FLAG_ENERGY_EXPENDED_PRESENT, FLAG_RR_INTERVAL_PRESENT, FLAG_SENSOR_CONTACT_DETECTED,
    FLAG_SENSOR_CONTACT_SUPPORTED, FLAG_VALUE_FORMAT_U16, RR_INTERVAL_RESOLUTION,
};
use crate::error::DecodeError;

/// One decoded Heart Rate Measurement notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartRateReading {
    pub bpm: u16,
    pub sensor_contact_supported: bool,
    pub sensor_contact_detected: bool,
    /// Kilojoules since the sensor last reset its counter, when the sensor sends it.
    pub energy_expended: Option<u16>,
    /// Beat-to-beat intervals in units of 1/1024 second.
    pub rr_intervals: Vec<u16>,
    pub timestamp: Instant,
}

impl HeartRateReading {
    pub fn rr_intervals_ms(&self) -> Vec<u32> {
        self.rr_intervals
            .iter()
            .map(|rr| u32::from(*rr) * 1000 / RR_INTERVAL_RESOLUTION)
            .collect()
    }
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let pair = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([pair[0], pair[1]]))
}

/// Decode a Heart Rate Measurement payload.
///
/// Only the flags byte and the BPM field are mandatory. Energy expended and RR
/// intervals are picked up when the flags announce them and the bytes are
/// actually there; anything else trailing the payload is ignored.
pub fn decode(payload: &[u8]) -> Result<HeartRateReading, DecodeError> {
    let flags = match payload.first() {
        Some(flags) => *flags,
        None => return Err(DecodeError::TooShort { expected: 2, actual: 0 }),
    };

    let wide = flags & FLAG_VALUE_FORMAT_U16 != 0;
    let bpm_width = if wide { 2 } else { 1 };
    let expected = 1 + bpm_width;

    if payload.len() < expected {
        return Err(DecodeError::TooShort { expected, actual: payload.len() });
    }

    let bpm = if wide {
        u16::from_le_bytes([payload[1], payload[2]])
    } else {
        u16::from(payload[1])
    };

    let sensor_contact_supported = flags & FLAG_SENSOR_CONTACT_SUPPORTED != 0;
    let sensor_contact_detected = sensor_contact_supported && flags & FLAG_SENSOR_CONTACT_DETECTED != 0;

    let mut offset = expected;

    let mut energy_expended = None;
    if flags & FLAG_ENERGY_EXPENDED_PRESENT != 0 {
        energy_expended = read_u16_le(payload, offset);
        offset += 2;
    }

    let mut rr_intervals = Vec::new();
    if flags & FLAG_RR_INTERVAL_PRESENT != 0 {
        while let Some(rr) = read_u16_le(payload, offset) {
            rr_intervals.push(rr);
            offset += 2;
        }
    }

    Ok(HeartRateReading {
        bpm,
        sensor_contact_supported,
        sensor_contact_detected,
        energy_expended,
        rr_intervals,
        timestamp: Instant::now(),
    })
}

/// The bytes written to the configuration characteristic: the text as UTF-8, untouched.
pub fn encode_config(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_8_bit_value() {
        let reading = decode(&[0x00, 72]).unwrap();
        assert_eq!(reading.bpm, 72);
        assert!(!reading.sensor_contact_supported);
        assert!(!reading.sensor_contact_detected);
        assert_eq!(reading.energy_expended, None);
        assert!(reading.rr_intervals.is_empty());
    }

    #[test]
    fn decodes_16_bit_little_endian_value() {
        assert_eq!(decode(&[0x01, 0x64, 0x00]).unwrap().bpm, 100);
        assert_eq!(decode(&[0x01, 0x2C, 0x01]).unwrap().bpm, 300);
    }

    #[test]
    fn rejects_short_payloads() {
        assert_eq!(decode(&[]), Err(DecodeError::TooShort { expected: 2, actual: 0 }));
        assert_eq!(decode(&[0x00]), Err(DecodeError::TooShort { expected: 2, actual: 1 }));
        assert_eq!(decode(&[0x01, 0x64]), Err(DecodeError::TooShort { expected: 3, actual: 2 }));
    }

    #[test]
    fn sensor_contact_bits() {
        let supported_only = decode(&[0x02, 60]).unwrap();
        assert!(supported_only.sensor_contact_supported);
        assert!(!supported_only.sensor_contact_detected);

        let detected = decode(&[0x06, 60]).unwrap();
        assert!(detected.sensor_contact_supported);
        assert!(detected.sensor_contact_detected);

        // the detected bit means nothing unless contact sensing is supported
        let unsupported = decode(&[0x04, 60]).unwrap();
        assert!(!unsupported.sensor_contact_supported);
        assert!(!unsupported.sensor_contact_detected);
    }

    #[test]
    fn trailing_bytes_do_not_fail() {
        let reading = decode(&[0x00, 80, 0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(reading.bpm, 80);
        assert!(reading.rr_intervals.is_empty());
    }

    #[test]
    fn energy_and_rr_intervals() {
        // 16-bit bpm, energy expended 0x0102, rr intervals 1024 and 512
        let payload = [0x19, 0x5A, 0x00, 0x02, 0x01, 0x00, 0x04, 0x00, 0x02];
        let reading = decode(&payload).unwrap();
        assert_eq!(reading.bpm, 90);
        assert_eq!(reading.energy_expended, Some(0x0102));
        assert_eq!(reading.rr_intervals, vec![1024, 512]);
        assert_eq!(reading.rr_intervals_ms(), vec![1000, 500]);
    }

    #[test]
    fn truncated_optional_fields_are_dropped() {
        let reading = decode(&[0x08, 70, 0x01]).unwrap();
        assert_eq!(reading.bpm, 70);
        assert_eq!(reading.energy_expended, None);

        let reading = decode(&[0x10, 70, 0x00, 0x04, 0x7F]).unwrap();
        assert_eq!(reading.rr_intervals, vec![1024]);
    }

    #[test]
    fn config_is_raw_utf8() {
        assert_eq!(encode_config("abc"), b"abc".to_vec());
        assert_eq!(encode_config(""), Vec::<u8>::new());
        assert_eq!(encode_config("freq=5;ñ"), "freq=5;ñ".as_bytes().to_vec());
    }
}
