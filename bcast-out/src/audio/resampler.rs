//! Audio resampling using rubato
//!
//! The device timeline runs at 48 kHz. Payloads delivered at any other rate are
//! converted here before channel remapping.

use super::types::AudioPayload;
use crate::error::{Error, Result};
use bcast_common::timing::DEVICE_SAMPLE_RATE;
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Stateless block resampler for device-bound audio
pub struct Resampler;

impl Resampler {
    /// Resample an interleaved payload to 48 kHz
    ///
    /// Payloads already at 48 kHz are returned unchanged.
    pub fn to_device_rate(payload: &AudioPayload) -> Result<AudioPayload> {
        let output_rate = DEVICE_SAMPLE_RATE;
        if payload.sample_rate == output_rate {
            return Ok(payload.clone());
        }
        if payload.sample_rate == 0 || payload.channels == 0 {
            return Err(Error::AudioConversion(format!(
                "cannot resample payload with rate {} and {} channels",
                payload.sample_rate, payload.channels
            )));
        }

        let input_frames = payload.frames();
        if input_frames == 0 {
            return Ok(AudioPayload::new(Vec::new(), payload.channels, output_rate));
        }

        debug!(
            "Resampling {} frames from {}Hz to {}Hz ({} channels)",
            input_frames, payload.sample_rate, output_rate, payload.channels
        );

        let planar_input = Self::deinterleave(&payload.samples, payload.channels);
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / payload.sample_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            payload.channels as usize,
        )
        .map_err(|e| Error::AudioConversion(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::AudioConversion(format!("Resampling failed: {}", e)))?;

        Ok(AudioPayload::new(
            Self::interleave(planar_output),
            payload.channels,
            output_rate,
        ))
    }

    /// Convert interleaved i16 samples to planar f32
    fn deinterleave(samples: &[i16], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];

        for frame in samples.chunks_exact(num_channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample as f32 / 32768.0);
            }
        }
        planar
    }

    /// Convert planar f32 samples back to interleaved i16, clamping to range
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<i16> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };
        let num_frames = first.len();
        let mut interleaved = Vec::with_capacity(num_frames * planar.len());

        for frame_idx in 0..num_frames {
            for channel in &planar {
                let value = (channel[frame_idx] * 32768.0).round();
                interleaved.push(value.clamp(i16::MIN as f32, i16::MAX as f32) as i16);
            }
        }
        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let planar = Resampler::deinterleave(&[16384, -16384, 0, 8192], 2);
        assert_eq!(planar, vec![vec![0.5, 0.0], vec![-0.5, 0.25]]);
    }

    #[test]
    fn test_interleave_clamps() {
        let interleaved = Resampler::interleave(vec![vec![2.0, 0.5], vec![-2.0, -0.5]]);
        assert_eq!(interleaved, vec![i16::MAX, i16::MIN, 16384, -16384]);
    }

    #[test]
    fn test_device_rate_passthrough() {
        let payload = AudioPayload::new(vec![1, 2, 3, 4], 2, 48_000);
        assert_eq!(Resampler::to_device_rate(&payload).unwrap(), payload);
    }

    #[test]
    fn test_resample_44100_changes_length() {
        let payload = AudioPayload::silence(2, 44_100, 1764);
        let out = Resampler::to_device_rate(&payload).unwrap();
        assert_eq!(out.sample_rate, 48_000);
        assert_eq!(out.channels, 2);
        // 1764 frames at 44.1 kHz is 40 ms; allow for filter delay
        let frames = out.frames() as i64;
        assert!((frames - 1920).abs() < 64, "got {} frames", frames);
    }

    #[test]
    fn test_zero_rate_rejected() {
        let payload = AudioPayload::new(vec![0; 4], 2, 0);
        assert!(Resampler::to_device_rate(&payload).is_err());
    }
}
