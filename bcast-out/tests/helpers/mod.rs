//! Shared fixtures for bcast-out integration tests
//!
//! - Frame builders for YUV and RGBA pictures with stereo audio
//! - `ScriptSource`: replays a fixed list of frames, then reports exhaustion
//! - `Harness`: an `Output` wired to a manually completed virtual device

#![allow(dead_code)]

use bcast_common::{OutputConfig, VideoProfile};
use bcast_out::audio::AudioPayload;
use bcast_out::device::{VirtualDevice, VirtualDriver};
use bcast_out::{Frame, FrameImage, FrameSource, ImageFormat, Output};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn yuv_frame(position: u64, width: u32, height: u32) -> Frame {
    let image = FrameImage::new(
        width,
        height,
        ImageFormat::Yuv422,
        vec![(position % 200) as u8 + 16; (width * height * 2) as usize],
    );
    let audio = AudioPayload::new(vec![position as i16; 2 * 1920], 2, 48_000);
    Frame::new(position, Some(image), Some(audio))
}

pub fn rgba_frame(position: u64, width: u32, height: u32) -> Frame {
    let image = FrameImage::new(width, height, ImageFormat::Rgba, vec![0x40; (width * height * 4) as usize]);
    Frame::new(position, Some(image), None)
}

/// Replays frames in order; `None` forever once they run out
pub struct ScriptSource {
    frames: VecDeque<Frame>,
}

impl ScriptSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// `count` full-size YUV frames for `profile`
    pub fn yuv(profile: &VideoProfile, count: u64) -> Self {
        Self::new(
            (0..count)
                .map(|p| yuv_frame(p, profile.width, profile.height))
                .collect(),
        )
    }
}

impl FrameSource for ScriptSource {
    fn pull_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}

pub struct Harness {
    pub output: Output,
    pub device: Arc<VirtualDevice>,
}

impl Harness {
    pub fn new(config: OutputConfig, source: impl FrameSource + 'static) -> Self {
        let device = VirtualDevice::builder("Test Output").keyer(true).build();
        Self::with_device(device, config, source)
    }

    pub fn with_device(
        device: Arc<VirtualDevice>,
        config: OutputConfig,
        source: impl FrameSource + 'static,
    ) -> Self {
        let driver = Arc::new(VirtualDriver::new(vec![Arc::clone(&device)]));
        let output = Output::new(config, driver, Box::new(source)).unwrap();
        Self { output, device }
    }

    /// Open card 0 and start; panics if either fails
    pub fn started(config: OutputConfig, frames: u64) -> Self {
        let source = ScriptSource::yuv(&config.profile, frames);
        let harness = Self::new(config, source);
        assert!(harness.output.open(0));
        assert!(harness.output.start());
        harness
    }
}

pub fn profile(width: u32, height: u32, num: u32, den: u32, progressive: bool) -> VideoProfile {
    VideoProfile {
        width,
        height,
        frame_rate_num: num,
        frame_rate_den: den,
        progressive,
    }
}

pub fn config_with(profile: VideoProfile) -> OutputConfig {
    OutputConfig {
        profile,
        ..Default::default()
    }
}

/// Poll `condition` for up to two seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
