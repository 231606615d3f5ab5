//! Audio conversion for the device timeline
//!
//! Upstream payloads arrive in whatever rate and channel layout the pipeline
//! produced. Each block is resampled to 48 kHz when needed, fitted to the exact
//! per-frame sample count, then remapped onto the device channel layout.

pub mod remap;
pub mod resampler;
pub mod types;

pub use remap::remap_channels;
pub use resampler::Resampler;
pub use types::{device_channels, AudioBlock, AudioPayload};

use crate::error::{Error, Result};

/// Convert a payload to `sample_count` interleaved frames of `out_channels`
pub fn convert_for_device(
    payload: &AudioPayload,
    sample_count: usize,
    out_channels: u16,
) -> Result<Vec<i16>> {
    if payload.channels == 0 {
        return Err(Error::AudioConversion(
            "audio payload has no channels".to_string(),
        ));
    }

    let at_rate = Resampler::to_device_rate(payload)?;
    let in_channels = at_rate.channels as usize;
    let mut samples = at_rate.samples;
    samples.resize(sample_count * in_channels, 0);

    Ok(remap_channels(
        &samples,
        at_rate.channels,
        out_channels,
        sample_count,
    ))
}
