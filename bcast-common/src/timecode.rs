//! VITC timecode parsing

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hours/minutes/seconds/frames timecode with optional user bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl Timecode {
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }

    /// Timecode for an absolute frame position at an integer base rate
    pub fn from_position(position: u64, base_fps: u32) -> Self {
        let base = base_fps.max(1) as u64;
        let frames = position % base;
        let total_seconds = position / base;
        Self {
            hours: ((total_seconds / 3600) % 24) as u8,
            minutes: ((total_seconds / 60) % 60) as u8,
            seconds: (total_seconds % 60) as u8,
            frames: frames as u8,
        }
    }
}

impl FromStr for Timecode {
    type Err = Error;

    /// Parse `H:M:S:F`; every field must be present and numeric
    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.trim().split(':').collect();
        if fields.len() != 4 {
            return Err(Error::InvalidInput(format!("timecode {:?} is not HH:MM:SS:FF", s)));
        }
        let mut values = [0u8; 4];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field
                .parse::<u8>()
                .map_err(|_| Error::InvalidInput(format!("bad timecode field {:?} in {:?}", field, s)))?;
        }
        if values[1] > 59 || values[2] > 59 {
            return Err(Error::InvalidInput(format!("timecode {:?} out of range", s)));
        }
        Ok(Timecode::new(values[0], values[1], values[2], values[3]))
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Parse timecode user bits written as a hexadecimal or decimal integer
pub fn parse_user_bits(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
