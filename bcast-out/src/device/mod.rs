//! Output device boundary
//!
//! The scheduler talks to hardware only through these traits. A device calls
//! back into the scheduler from its own threads through [`OutputCallback`],
//! held as a `Weak` reference so the device never keeps the scheduler alive.

pub mod virtual_device;

pub use virtual_device::{CompletionMode, VirtualDevice, VirtualDriver};

use crate::error::{Error, Result};
use bcast_common::Timecode;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::BitOr;
use std::sync::{Arc, Weak};

/// Field order of a display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDominance {
    Progressive,
    UpperFirst,
    LowerFirst,
}

/// A video mode the device can output
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMode {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Frame duration in `time_scale` units
    pub frame_duration: u64,
    /// Ticks per second
    pub time_scale: u64,
    pub field_dominance: FieldDominance,
}

impl DisplayMode {
    pub fn new(
        name: &str,
        width: u32,
        height: u32,
        frame_duration: u64,
        time_scale: u64,
        field_dominance: FieldDominance,
    ) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            frame_duration,
            time_scale,
            field_dominance,
        }
    }

    pub fn fps(&self) -> f64 {
        if self.frame_duration == 0 {
            return 0.0;
        }
        self.time_scale as f64 / self.frame_duration as f64
    }

    pub fn is_progressive(&self) -> bool {
        self.field_dominance == FieldDominance::Progressive
    }

    pub fn top_field_first(&self) -> bool {
        self.field_dominance == FieldDominance::UpperFirst
    }
}

/// Pixel layout of a device frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit 4:2:2, Cb Y0 Cr Y1 byte order
    Yuv8,
    /// 8-bit ARGB
    Argb8,
    /// 10-bit 4:2:2 packed as v210
    Yuv10,
}

/// Options passed when enabling video output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoOutputFlags(u32);

impl VideoOutputFlags {
    pub const NONE: VideoOutputFlags = VideoOutputFlags(0);
    pub const RP188: VideoOutputFlags = VideoOutputFlags(1 << 0);
    pub const VITC: VideoOutputFlags = VideoOutputFlags(1 << 1);
    pub const VANC: VideoOutputFlags = VideoOutputFlags(1 << 2);

    pub fn contains(&self, other: VideoOutputFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VideoOutputFlags {
    type Output = VideoOutputFlags;

    fn bitor(self, rhs: Self) -> Self {
        VideoOutputFlags(self.0 | rhs.0)
    }
}

/// How a scheduled frame left the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionResult {
    Displayed,
    DisplayedLate,
    Dropped,
    Flushed,
}

/// Vertical blanking buffers attached to a frame
#[derive(Debug, Clone)]
pub struct AncillaryData {
    pub format: PixelFormat,
    row_bytes: usize,
    first_line: u32,
    last_line: u32,
    lines: BTreeMap<u32, Vec<u8>>,
}

impl AncillaryData {
    /// Blanking storage for lines `first_line..=last_line`, `row_bytes` each
    pub fn new(format: PixelFormat, row_bytes: usize, first_line: u32, last_line: u32) -> Self {
        Self {
            format,
            row_bytes,
            first_line,
            last_line,
            lines: BTreeMap::new(),
        }
    }

    /// Writable buffer for one blanking line
    pub fn line_buffer(&mut self, line: u32) -> Result<&mut [u8]> {
        if line < self.first_line || line > self.last_line {
            return Err(Error::Ancillary(format!(
                "line {} outside vertical blanking {}..={}",
                line, self.first_line, self.last_line
            )));
        }
        let row_bytes = self.row_bytes;
        Ok(self
            .lines
            .entry(line)
            .or_insert_with(|| vec![0; row_bytes])
            .as_mut_slice())
    }

    pub fn line(&self, line: u32) -> Option<&[u8]> {
        self.lines.get(&line).map(Vec::as_slice)
    }

    /// Line numbers that have been written
    pub fn written_lines(&self) -> Vec<u32> {
        self.lines.keys().copied().collect()
    }
}

/// A device-native video frame buffer
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub row_bytes: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub vitc: Option<Timecode>,
    pub user_bits: Option<u32>,
    pub ancillary: Option<AncillaryData>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, row_bytes: usize, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            row_bytes,
            format,
            data: vec![0; row_bytes * height as usize],
            vitc: None,
            user_bits: None,
            ancillary: None,
        }
    }

    /// Drop per-frame signaling before the buffer is reused
    pub fn clear_signaling(&mut self) {
        self.vitc = None;
        self.user_bits = None;
        self.ancillary = None;
    }
}

/// Frame buffer shared between the scheduler pool and the device
pub type SharedFrame = Arc<Mutex<VideoFrame>>;

/// Keyer control exposed by devices that support keying
pub trait Keyer: Send + Sync {
    fn enable(&self, external: bool) -> Result<()>;
    fn set_level(&self, level: u8) -> Result<()>;
    fn disable(&self) -> Result<()>;
}

/// Notifications delivered by the device on its own threads
pub trait OutputCallback: Send + Sync {
    /// A scheduled frame was displayed, displayed late, dropped or flushed
    fn scheduled_frame_completed(&self, frame: SharedFrame, result: CompletionResult);

    /// The device wants more audio; `preroll` is set while filling before playback
    fn render_audio_samples(&self, preroll: bool);

    /// Scheduled playback came to a halt
    fn scheduled_playback_has_stopped(&self);
}

/// A scheduled-playback video output device
pub trait OutputDevice: Send + Sync {
    fn model_name(&self) -> String;

    fn display_modes(&self) -> Result<Vec<DisplayMode>>;

    /// Whether frames can carry vertical ancillary data
    fn supports_vanc(&self) -> bool;

    fn keyer(&self) -> Option<Arc<dyn Keyer>>;

    fn set_callback(&self, callback: Weak<dyn OutputCallback>);

    fn enable_video_output(&self, mode: &DisplayMode, flags: VideoOutputFlags) -> Result<()>;

    fn disable_video_output(&self) -> Result<()>;

    /// Enable timestamped 16-bit audio output
    fn enable_audio_output(&self, sample_rate: u32, channels: u16) -> Result<()>;

    fn disable_audio_output(&self) -> Result<()>;

    fn create_video_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: usize,
        format: PixelFormat,
    ) -> Result<SharedFrame>;

    fn create_ancillary_data(&self, format: PixelFormat) -> Result<AncillaryData>;

    /// Convert `src` into the pixel format of `dst`
    fn convert_frame(&self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<()>;

    /// Queue a frame for display at `display_time` (in `time_scale` units)
    fn schedule_video_frame(
        &self,
        frame: SharedFrame,
        display_time: u64,
        duration: u64,
        time_scale: u64,
    ) -> Result<()>;

    /// Queue interleaved samples at `stream_time`; returns the number of sample frames accepted
    fn schedule_audio_samples(
        &self,
        samples: &[i16],
        sample_count: u32,
        stream_time: u64,
        time_scale: u64,
    ) -> Result<u32>;

    fn begin_audio_preroll(&self) -> Result<()>;

    fn start_scheduled_playback(&self, start_time: u64, time_scale: u64, speed: f64) -> Result<()>;

    /// Stop playback immediately; pending frames complete as flushed
    fn stop_scheduled_playback(&self) -> Result<()>;
}

/// Enumerates and opens output devices
pub trait DeviceDriver: Send + Sync {
    /// Model names of output-capable devices, in card order
    fn list_devices(&self) -> Result<Vec<String>>;

    /// Open the output device at `index`
    fn open(&self, index: u32) -> Result<Arc<dyn OutputDevice>>;
}
