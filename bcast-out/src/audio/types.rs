//! Audio payload and queue block types

/// Interleaved signed 16-bit PCM attached to an upstream frame
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioPayload {
    pub fn new(samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    pub fn silence(channels: u16, sample_rate: u32, frames: usize) -> Self {
        Self::new(vec![0; frames * channels as usize], channels, sample_rate)
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Audio queued for the device audio callback
///
/// `sequence` is the video frame counter at the time the block was queued; it
/// positions the block on the device's 48 kHz timeline.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub payload: AudioPayload,
    pub sequence: u64,
}

/// Output channel count the device is configured for, given the upstream count
pub fn device_channels(input_channels: u16) -> u16 {
    if input_channels <= 2 {
        2
    } else if input_channels <= 8 {
        8
    } else {
        16
    }
}
