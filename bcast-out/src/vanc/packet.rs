//! SMPTE 291 ancillary packet words
//!
//! Each 8-bit value travels in a 10-bit word: bit 8 is even parity over bits
//! 0-7 and bit 9 is the inverse of bit 8. The checksum word is the 9-bit sum of
//! DID through the last user data word, with bit 9 the inverse of bit 8.

use crate::error::{Error, Result};

/// Ancillary data flag preceding every packet
pub const ADF: [u16; 3] = [0x000, 0x3FF, 0x3FF];

/// Maximum user data words in one packet
pub const MAX_USER_WORDS: usize = 255;

/// Add parity bits to an 8-bit value
pub fn with_parity(value: u8) -> u16 {
    let b8 = (value.count_ones() & 1) as u16;
    let b9 = b8 ^ 1;
    (b9 << 9) | (b8 << 8) | value as u16
}

/// Checksum word over DID, SDID, DC and user data words
pub fn checksum(words: &[u16]) -> u16 {
    let sum = words.iter().fold(0u16, |acc, w| acc.wrapping_add(w & 0x1FF)) & 0x1FF;
    let b9 = ((sum >> 8) & 1) ^ 1;
    (b9 << 9) | sum
}

/// A type 2 ancillary packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncPacket {
    pub did: u8,
    pub sdid: u8,
    pub user_data: Vec<u8>,
}

impl AncPacket {
    pub fn new(did: u8, sdid: u8, user_data: Vec<u8>) -> Result<Self> {
        if user_data.len() > MAX_USER_WORDS {
            return Err(Error::Ancillary(format!(
                "ancillary payload of {} bytes exceeds {}",
                user_data.len(),
                MAX_USER_WORDS
            )));
        }
        Ok(Self {
            did,
            sdid,
            user_data,
        })
    }

    /// Full packet: ADF, DID, SDID, DC, user data, checksum
    pub fn to_words(&self) -> Vec<u16> {
        let mut words = Vec::with_capacity(ADF.len() + 4 + self.user_data.len());
        words.extend_from_slice(&ADF);
        let header = [
            with_parity(self.did),
            with_parity(self.sdid),
            with_parity(self.user_data.len() as u8),
        ];
        words.extend_from_slice(&header);
        words.extend(self.user_data.iter().map(|b| with_parity(*b)));
        let cs = checksum(&words[ADF.len()..]);
        words.push(cs);
        words
    }
}
