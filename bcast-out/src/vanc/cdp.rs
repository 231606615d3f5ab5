//! Caption Distribution Packets (SMPTE 334-2 / CEA-708)

use crate::error::{Error, Result};
use tracing::warn;

/// CDP identifier bytes
const CDP_IDENTIFIER: [u8; 2] = [0x96, 0x69];
const CCDATA_SECTION_ID: u8 = 0x72;
const FOOTER_SECTION_ID: u8 = 0x74;

const FLAG_CCDATA_PRESENT: u8 = 0x40;
const FLAG_CAPTION_SERVICE_ACTIVE: u8 = 0x02;
const FLAG_RESERVED: u8 = 0x01;

/// Most caption units a single CDP carries
pub const MAX_CC_COUNT: usize = 30;

/// One caption triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionUnit {
    pub valid: bool,
    pub cc_type: u8,
    pub data: [u8; 2],
}

impl CaptionUnit {
    /// Decode from a raw `(flags, d1, d2)` triple
    pub fn from_triple(triple: &[u8]) -> Self {
        Self {
            valid: triple[0] & 0x04 != 0,
            cc_type: triple[0] & 0x03,
            data: [triple[1], triple[2]],
        }
    }
}

/// CDP frame rate code for a frame `duration` in `time_scale` units
pub fn frame_rate_code(duration: u64, time_scale: u64) -> Result<u8> {
    const RATES: [(u64, u64, u8); 8] = [
        (24_000, 1001, 1),
        (24, 1, 2),
        (25, 1, 3),
        (30_000, 1001, 4),
        (30, 1, 5),
        (50, 1, 6),
        (60_000, 1001, 7),
        (60, 1, 8),
    ];
    RATES
        .iter()
        .find(|(num, den, _)| time_scale * den == duration * num)
        .map(|(_, _, code)| *code)
        .ok_or_else(|| {
            Error::Ancillary(format!(
                "no caption frame rate for {}/{}",
                time_scale, duration
            ))
        })
}

/// Caption units from a raw blob of `size` bytes, clamped to [`MAX_CC_COUNT`]
pub fn caption_units(blob: &[u8], size: usize) -> Vec<CaptionUnit> {
    let mut count = size.min(blob.len()) / 3;
    if count > MAX_CC_COUNT {
        warn!("Clamping caption count {} to {}", count, MAX_CC_COUNT);
        count = MAX_CC_COUNT;
    }
    blob.chunks_exact(3)
        .take(count)
        .map(CaptionUnit::from_triple)
        .collect()
}

/// A caption distribution packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cdp {
    pub frame_rate_code: u8,
    pub sequence: u16,
    pub units: Vec<CaptionUnit>,
}

impl Cdp {
    pub fn new(frame_rate_code: u8, sequence: u16, units: Vec<CaptionUnit>) -> Self {
        Self {
            frame_rate_code,
            sequence,
            units,
        }
    }

    /// Serialize to bytes; the trailing checksum makes the byte sum zero
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.units.len().min(MAX_CC_COUNT);
        let length = 7 + 2 + 3 * count + 4;
        let [seq_hi, seq_lo] = self.sequence.to_be_bytes();

        let mut bytes = Vec::with_capacity(length);
        bytes.extend_from_slice(&CDP_IDENTIFIER);
        bytes.push(length as u8);
        bytes.push((self.frame_rate_code << 4) | 0x0F);
        bytes.push(FLAG_CCDATA_PRESENT | FLAG_CAPTION_SERVICE_ACTIVE | FLAG_RESERVED);
        bytes.extend_from_slice(&[seq_hi, seq_lo]);

        bytes.push(CCDATA_SECTION_ID);
        bytes.push(0xE0 | count as u8);
        for unit in &self.units[..count] {
            bytes.push(0xF8 | ((unit.valid as u8) << 2) | (unit.cc_type & 0x03));
            bytes.extend_from_slice(&unit.data);
        }

        bytes.extend_from_slice(&[FOOTER_SECTION_ID, seq_hi, seq_lo]);
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        bytes.push(sum.wrapping_neg());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_codes() {
        assert_eq!(frame_rate_code(1001, 30_000).unwrap(), 4);
        assert_eq!(frame_rate_code(1000, 25_000).unwrap(), 3);
        assert_eq!(frame_rate_code(1, 50).unwrap(), 6);
        assert_eq!(frame_rate_code(1001, 60_000).unwrap(), 7);
        assert!(frame_rate_code(1000, 48_000).is_err());
    }

    #[test]
    fn test_nine_bytes_make_three_units() {
        let blob = [0xFC, 0x94, 0x20, 0xFD, 0x80, 0x80, 0xFA, 0x00, 0x00];
        let units = caption_units(&blob, 9);
        assert_eq!(units.len(), 3);
        assert!(units[0].valid);
        assert_eq!(units[0].cc_type, 0);
        assert_eq!(units[1].cc_type, 1);
        assert_eq!(units[2].cc_type, 2);
        assert_eq!(units[2].data, [0, 0]);
    }

    #[test]
    fn test_caption_count_clamped() {
        let blob = vec![0xFC; 3 * 40];
        assert_eq!(caption_units(&blob, blob.len()).len(), MAX_CC_COUNT);
    }

    #[test]
    fn test_cdp_layout() {
        let units = caption_units(&[0xFC, 0x94, 0x20, 0xF9, 0x00, 0x00], 6);
        let bytes = Cdp::new(4, 0x1234, units).to_bytes();
        assert_eq!(&bytes[..2], &[0x96, 0x69]);
        assert_eq!(bytes[2] as usize, bytes.len());
        assert_eq!(bytes.len(), 7 + 2 + 6 + 4);
        assert_eq!(bytes[3], 0x4F);
        assert_eq!(bytes[4], 0x43);
        assert_eq!(&bytes[5..7], &[0x12, 0x34]);
        assert_eq!(&bytes[7..9], &[0x72, 0xE2]);
        assert_eq!(&bytes[9..12], &[0xFC, 0x94, 0x20]);
        assert_eq!(bytes[12], 0xF9);
        assert_eq!(&bytes[15..18], &[0x74, 0x12, 0x34]);
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }
}
