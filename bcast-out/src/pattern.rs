//! Colour bars and tone test source
//!
//! Generates 75% SMPTE-style bars in the layout the scheduler expects (YUYV
//! for plain output, RGBA for keyer output) with a 1 kHz sine on every audio
//! channel. Frames can optionally carry captions, splice cues and timecode.

use crate::audio::AudioPayload;
use crate::frame::{Frame, FrameImage, FrameSource, ImageFormat};
use bcast_common::timing::{frame_samples, DEVICE_SAMPLE_RATE};
use bcast_common::{Timecode, VideoProfile};
use std::f64::consts::PI;

const TONE_HZ: f64 = 1_000.0;
/// -20 dBFS
const TONE_AMPLITUDE: f64 = 3_277.0;

/// Bar colours as (Y, Cb, Cr) and (R, G, B)
const BARS: [((u8, u8, u8), (u8, u8, u8)); 7] = [
    ((180, 128, 128), (191, 191, 191)),
    ((168, 44, 136), (191, 191, 0)),
    ((145, 147, 44), (0, 191, 191)),
    ((133, 63, 52), (0, 191, 0)),
    ((63, 193, 204), (191, 0, 191)),
    ((51, 109, 212), (191, 0, 0)),
    ((28, 212, 120), (0, 0, 191)),
];

pub struct PatternSource {
    profile: VideoProfile,
    image: FrameImage,
    channels: u16,
    position: u64,
    sample_position: u64,
    limit: Option<u64>,
    captions: bool,
    splice_interval: Option<u64>,
}

impl PatternSource {
    pub fn new(profile: &VideoProfile, keyer: bool, channels: u16) -> Self {
        let format = if keyer {
            ImageFormat::Rgba
        } else {
            ImageFormat::Yuv422
        };
        Self {
            profile: *profile,
            image: bars(profile.width, profile.height, format),
            channels,
            position: 0,
            sample_position: 0,
            limit: None,
            captions: false,
            splice_interval: None,
        }
    }

    /// Stop after `frames` frames
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Attach a null caption pair to every frame
    pub fn with_captions(mut self) -> Self {
        self.captions = true;
        self
    }

    /// Attach a splice cue every `interval` frames; 0 means none
    pub fn with_splice_every(mut self, interval: u64) -> Self {
        self.splice_interval = (interval > 0).then_some(interval);
        self
    }

    fn tone(&mut self) -> AudioPayload {
        let count = frame_samples(
            self.position,
            DEVICE_SAMPLE_RATE,
            self.profile.frame_rate_num as u64,
            self.profile.frame_rate_den as u64,
        ) as usize;
        let channels = self.channels as usize;
        let mut samples = Vec::with_capacity(count * channels);
        for i in 0..count as u64 {
            let t = (self.sample_position + i) as f64 / DEVICE_SAMPLE_RATE as f64;
            let value = (TONE_AMPLITUDE * (2.0 * PI * TONE_HZ * t).sin()) as i16;
            samples.extend(std::iter::repeat(value).take(channels));
        }
        self.sample_position += count as u64;
        AudioPayload::new(samples, self.channels, DEVICE_SAMPLE_RATE)
    }
}

impl FrameSource for PatternSource {
    fn pull_frame(&mut self) -> Option<Frame> {
        if self.is_exhausted() {
            return None;
        }

        let audio = self.tone();
        let mut frame = Frame::new(self.position, Some(self.image.clone()), Some(audio));
        let base_fps = self.profile.fps().round() as u32;
        frame.metadata.timecode = Some(Timecode::from_position(self.position, base_fps).to_string());
        if self.captions {
            frame.metadata.caption_size = Some("3".to_string());
            frame.metadata.captions = Some(vec![0xFC, 0x80, 0x80]);
        }
        if let Some(interval) = self.splice_interval {
            if self.position % interval == 0 {
                frame.metadata.splice =
                    Some("-insert_type 1 -pre_roll 4000 -break_duration 300".to_string());
            }
        }

        self.position += 1;
        Some(frame)
    }

    fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.position >= limit)
    }
}

/// Seven vertical bars covering the full picture
pub fn bars(width: u32, height: u32, format: ImageFormat) -> FrameImage {
    let w = width as usize;
    let mut row = Vec::with_capacity(w * format.bytes_per_pixel());
    match format {
        ImageFormat::Yuv422 => {
            for x in (0..w).step_by(2) {
                let ((y, cb, cr), _) = BARS[x * BARS.len() / w.max(1)];
                row.extend_from_slice(&[y, cb, y, cr]);
            }
            row.truncate(w * 2);
        }
        ImageFormat::Rgba => {
            for x in 0..w {
                let (_, (r, g, b)) = BARS[x * BARS.len() / w.max(1)];
                row.extend_from_slice(&[r, g, b, 0xFF]);
            }
        }
    }
    let data = row.repeat(height as usize);
    FrameImage::new(width, height, format, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_layout() {
        let image = bars(14, 2, ImageFormat::Yuv422);
        assert_eq!(image.data.len(), 14 * 2 * 2);
        assert_eq!(&image.data[..4], &[180, 128, 180, 128]);
        assert_eq!(&image.data[24..28], &[28, 212, 28, 120]);

        let image = bars(7, 1, ImageFormat::Rgba);
        assert_eq!(&image.data[4..8], &[191, 191, 0, 0xFF]);
    }

    #[test]
    fn test_limit_exhausts_source() {
        let profile = VideoProfile::default();
        let mut source = PatternSource::new(&profile, false, 2).with_limit(2);
        assert!(source.pull_frame().is_some());
        assert!(!source.is_exhausted());
        assert!(source.pull_frame().is_some());
        assert!(source.is_exhausted());
        assert!(source.pull_frame().is_none());
    }

    #[test]
    fn test_ntsc_tone_follows_cadence() {
        let profile = VideoProfile {
            width: 720,
            height: 480,
            frame_rate_num: 30_000,
            frame_rate_den: 1001,
            progressive: false,
        };
        let mut source = PatternSource::new(&profile, false, 2);
        let total: usize = (0..5)
            .map(|_| source.pull_frame().unwrap().audio.unwrap().frames())
            .sum();
        assert_eq!(total, 8008);
    }

    #[test]
    fn test_metadata_options() {
        let profile = VideoProfile::default();
        let mut source = PatternSource::new(&profile, false, 2)
            .with_captions()
            .with_splice_every(2);
        let first = source.pull_frame().unwrap();
        assert_eq!(first.metadata.caption_len(), 3);
        assert!(first.metadata.splice_command().is_some());
        assert_eq!(first.metadata.timecode.as_deref(), Some("00:00:00:00"));
        let second = source.pull_frame().unwrap();
        assert!(second.metadata.splice.is_none());
    }

    #[test]
    fn test_zero_splice_interval_disables_cues() {
        let profile = VideoProfile::default();
        let mut source = PatternSource::new(&profile, false, 2).with_splice_every(0);
        for _ in 0..3 {
            assert!(source.pull_frame().unwrap().metadata.splice.is_none());
        }
    }
}
