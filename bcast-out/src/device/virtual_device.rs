//! Software output device
//!
//! Implements [`OutputDevice`] without hardware. Scheduled frames are queued
//! and completed either on demand ([`CompletionMode::Manual`]) or by a clock
//! thread running at the display mode's frame rate ([`CompletionMode::Clocked`]).
//! Every schedule call is recorded so callers can inspect what would have gone
//! to air, and allocation or scheduling failures can be injected.

use super::{
    AncillaryData, CompletionResult, DeviceDriver, DisplayMode, FieldDominance, Keyer,
    OutputCallback, OutputDevice, PixelFormat, SharedFrame, VideoFrame, VideoOutputFlags,
};
use crate::error::{Error, Result};
use crate::video::convert::{argb8_to_v210, v210_row_bytes, yuv8_to_v210};
use bcast_common::Timecode;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How scheduled frames are completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Only [`VirtualDevice::complete_next`] completes frames
    Manual,
    /// A clock thread completes one frame per frame period once playback starts
    Clocked,
}

/// A recorded video schedule call
#[derive(Debug, Clone)]
pub struct ScheduleRecord {
    pub display_time: u64,
    pub duration: u64,
    pub time_scale: u64,
    pub format: PixelFormat,
    pub vanc_lines: Vec<u32>,
    pub vitc: Option<Timecode>,
    pub user_bits: Option<u32>,
}

/// A recorded audio schedule call
#[derive(Debug, Clone)]
pub struct AudioRecord {
    pub stream_time: u64,
    pub sample_count: u32,
    pub written: u32,
    pub samples: Vec<i16>,
}

/// Keyer settings last applied to the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyerState {
    pub enabled: bool,
    pub external: bool,
    pub level: u8,
}

#[derive(Debug, Default)]
struct VirtualKeyer {
    state: Mutex<KeyerState>,
    failing: AtomicBool,
}

impl VirtualKeyer {
    fn check(&self, op: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Device(format!("keyer {} failed", op)));
        }
        Ok(())
    }
}

impl Keyer for VirtualKeyer {
    fn enable(&self, external: bool) -> Result<()> {
        self.check("enable")?;
        let mut state = self.state.lock();
        state.enabled = true;
        state.external = external;
        Ok(())
    }

    fn set_level(&self, level: u8) -> Result<()> {
        self.check("set level")?;
        self.state.lock().level = level;
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.check("disable")?;
        self.state.lock().enabled = false;
        Ok(())
    }
}

#[derive(Default)]
struct Failures {
    frame_allocations: u32,
    schedules: u32,
    ancillary: bool,
    audio_write_limit: Option<u32>,
}

#[derive(Default)]
struct DeviceState {
    video_mode: Option<DisplayMode>,
    video_flags: VideoOutputFlags,
    audio: Option<(u32, u16)>,
    audio_preroll: bool,
    playing: bool,
    scheduled: VecDeque<SharedFrame>,
    history: Vec<ScheduleRecord>,
    audio_history: Vec<AudioRecord>,
    stopped_notifications: u32,
    failures: Failures,
}

struct Clock {
    stop: Mutex<bool>,
    wake: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`VirtualDevice`]
pub struct VirtualDeviceBuilder {
    model_name: String,
    modes: Vec<DisplayMode>,
    vanc: bool,
    keyer: bool,
    completion: CompletionMode,
}

impl VirtualDeviceBuilder {
    pub fn modes(mut self, modes: Vec<DisplayMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn vanc(mut self, supported: bool) -> Self {
        self.vanc = supported;
        self
    }

    pub fn keyer(mut self, supported: bool) -> Self {
        self.keyer = supported;
        self
    }

    pub fn completion(mut self, mode: CompletionMode) -> Self {
        self.completion = mode;
        self
    }

    pub fn build(self) -> Arc<VirtualDevice> {
        Arc::new_cyclic(|self_ref| VirtualDevice {
            self_ref: self_ref.clone(),
            model_name: self.model_name,
            modes: self.modes,
            vanc: self.vanc,
            keyer: self
                .keyer
                .then(|| Arc::new(VirtualKeyer::default())),
            completion: self.completion,
            state: Mutex::new(DeviceState::default()),
            callback: Mutex::new(None),
            clock: Clock {
                stop: Mutex::new(false),
                wake: Condvar::new(),
                handle: Mutex::new(None),
            },
        })
    }
}

/// Display modes offered by a virtual device unless overridden
pub fn standard_modes() -> Vec<DisplayMode> {
    use FieldDominance::*;
    vec![
        DisplayMode::new("NTSC", 720, 486, 1001, 30_000, LowerFirst),
        DisplayMode::new("PAL", 720, 576, 1000, 25_000, UpperFirst),
        DisplayMode::new("HD 720p 50", 1280, 720, 1000, 50_000, Progressive),
        DisplayMode::new("HD 720p 59.94", 1280, 720, 1001, 60_000, Progressive),
        DisplayMode::new("HD 720p 60", 1280, 720, 1000, 60_000, Progressive),
        DisplayMode::new("HD 1080p 23.98", 1920, 1080, 1001, 24_000, Progressive),
        DisplayMode::new("HD 1080p 24", 1920, 1080, 1000, 24_000, Progressive),
        DisplayMode::new("HD 1080p 25", 1920, 1080, 1000, 25_000, Progressive),
        DisplayMode::new("HD 1080p 29.97", 1920, 1080, 1001, 30_000, Progressive),
        DisplayMode::new("HD 1080p 30", 1920, 1080, 1000, 30_000, Progressive),
        DisplayMode::new("HD 1080i 50", 1920, 1080, 1000, 25_000, UpperFirst),
        DisplayMode::new("HD 1080i 59.94", 1920, 1080, 1001, 30_000, UpperFirst),
        DisplayMode::new("HD 1080i 60", 1920, 1080, 1000, 30_000, UpperFirst),
        DisplayMode::new("HD 1080p 50", 1920, 1080, 1000, 50_000, Progressive),
        DisplayMode::new("HD 1080p 59.94", 1920, 1080, 1001, 60_000, Progressive),
        DisplayMode::new("HD 1080p 60", 1920, 1080, 1000, 60_000, Progressive),
    ]
}

/// Software implementation of [`OutputDevice`]
pub struct VirtualDevice {
    self_ref: Weak<VirtualDevice>,
    model_name: String,
    modes: Vec<DisplayMode>,
    vanc: bool,
    keyer: Option<Arc<VirtualKeyer>>,
    completion: CompletionMode,
    state: Mutex<DeviceState>,
    callback: Mutex<Option<Weak<dyn OutputCallback>>>,
    clock: Clock,
}

impl VirtualDevice {
    pub fn builder(model_name: &str) -> VirtualDeviceBuilder {
        VirtualDeviceBuilder {
            model_name: model_name.to_string(),
            modes: standard_modes(),
            vanc: true,
            keyer: false,
            completion: CompletionMode::Manual,
        }
    }

    fn callback(&self) -> Option<Arc<dyn OutputCallback>> {
        self.callback.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Complete the oldest scheduled frame; false when nothing is queued
    pub fn complete_next(&self, result: CompletionResult) -> bool {
        let frame = self.state.lock().scheduled.pop_front();
        let Some(frame) = frame else {
            return false;
        };
        if let Some(callback) = self.callback() {
            callback.scheduled_frame_completed(frame, result);
        }
        true
    }

    /// Ask the scheduler for audio as the device audio thread would
    pub fn request_audio(&self, preroll: bool) {
        if let Some(callback) = self.callback() {
            callback.render_audio_samples(preroll);
        }
    }

    /// Fail the next `count` frame allocations
    pub fn fail_frame_allocations(&self, count: u32) {
        self.state.lock().failures.frame_allocations = count;
    }

    /// Fail the next `count` video schedule calls
    pub fn fail_schedules(&self, count: u32) {
        self.state.lock().failures.schedules = count;
    }

    /// Make every ancillary allocation fail while set
    pub fn fail_ancillary_allocation(&self, fail: bool) {
        self.state.lock().failures.ancillary = fail;
    }

    /// Make every keyer call fail while set
    pub fn fail_keyer(&self, fail: bool) {
        if let Some(keyer) = &self.keyer {
            keyer.failing.store(fail, Ordering::SeqCst);
        }
    }

    /// Accept at most `limit` sample frames per audio schedule call
    pub fn limit_audio_writes(&self, limit: Option<u32>) {
        self.state.lock().failures.audio_write_limit = limit;
    }

    pub fn scheduled_count(&self) -> usize {
        self.state.lock().scheduled.len()
    }

    pub fn schedule_history(&self) -> Vec<ScheduleRecord> {
        self.state.lock().history.clone()
    }

    pub fn audio_history(&self) -> Vec<AudioRecord> {
        self.state.lock().audio_history.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn in_audio_preroll(&self) -> bool {
        self.state.lock().audio_preroll
    }

    pub fn video_mode(&self) -> Option<DisplayMode> {
        self.state.lock().video_mode.clone()
    }

    pub fn video_flags(&self) -> VideoOutputFlags {
        self.state.lock().video_flags
    }

    pub fn audio_config(&self) -> Option<(u32, u16)> {
        self.state.lock().audio
    }

    pub fn keyer_state(&self) -> Option<KeyerState> {
        self.keyer.as_ref().map(|k| *k.state.lock())
    }

    pub fn stopped_notifications(&self) -> u32 {
        self.state.lock().stopped_notifications
    }

    fn start_clock(&self, mode: &DisplayMode) {
        let mut handle = self.clock.handle.lock();
        if handle.is_some() {
            return;
        }
        *self.clock.stop.lock() = false;

        let period = Duration::from_secs_f64(mode.frame_duration as f64 / mode.time_scale as f64);
        let device = self.self_ref.clone();
        *handle = Some(thread::spawn(move || {
            let started = Instant::now();
            let mut tick: u32 = 0;
            loop {
                let Some(device) = device.upgrade() else {
                    break;
                };
                tick = tick.saturating_add(1);
                let deadline = started + period * tick;
                {
                    let mut stop = device.clock.stop.lock();
                    if !*stop {
                        device.clock.wake.wait_until(&mut stop, deadline);
                    }
                    if *stop {
                        break;
                    }
                }
                let result = tick_result(Instant::now().saturating_duration_since(deadline), period);
                device.complete_next(result);
                if device.state.lock().audio.is_some() {
                    device.request_audio(false);
                }
            }
        }));
        debug!("Virtual device clock started ({:?} per frame)", period);
    }

    fn stop_clock(&self) {
        *self.clock.stop.lock() = true;
        self.clock.wake.notify_all();
        let handle = self.clock.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Virtual device clock thread panicked");
            }
        }
    }
}

/// Completion reported by a clock tick that ran `lateness` past its deadline
fn tick_result(lateness: Duration, period: Duration) -> CompletionResult {
    if lateness >= period {
        CompletionResult::DisplayedLate
    } else {
        CompletionResult::Displayed
    }
}

impl OutputDevice for VirtualDevice {
    fn model_name(&self) -> String {
        self.model_name.clone()
    }

    fn display_modes(&self) -> Result<Vec<DisplayMode>> {
        Ok(self.modes.clone())
    }

    fn supports_vanc(&self) -> bool {
        self.vanc
    }

    fn keyer(&self) -> Option<Arc<dyn Keyer>> {
        self.keyer.clone().map(|k| k as Arc<dyn Keyer>)
    }

    fn set_callback(&self, callback: Weak<dyn OutputCallback>) {
        *self.callback.lock() = Some(callback);
    }

    fn enable_video_output(&self, mode: &DisplayMode, flags: VideoOutputFlags) -> Result<()> {
        let mut state = self.state.lock();
        if !self.modes.contains(mode) {
            return Err(Error::Device(format!("unsupported display mode {}", mode.name)));
        }
        state.video_mode = Some(mode.clone());
        state.video_flags = flags;
        info!("{}: video output enabled in {}", self.model_name, mode.name);
        Ok(())
    }

    fn disable_video_output(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.video_mode = None;
        state.video_flags = VideoOutputFlags::NONE;
        Ok(())
    }

    fn enable_audio_output(&self, sample_rate: u32, channels: u16) -> Result<()> {
        if !matches!(channels, 2 | 8 | 16) {
            return Err(Error::Device(format!("unsupported channel count {}", channels)));
        }
        self.state.lock().audio = Some((sample_rate, channels));
        Ok(())
    }

    fn disable_audio_output(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.audio = None;
        state.audio_preroll = false;
        Ok(())
    }

    fn create_video_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: usize,
        format: PixelFormat,
    ) -> Result<SharedFrame> {
        let mut state = self.state.lock();
        if state.failures.frame_allocations > 0 {
            state.failures.frame_allocations -= 1;
            return Err(Error::Allocation(format!(
                "injected failure allocating {}x{} frame",
                width, height
            )));
        }
        Ok(Arc::new(Mutex::new(VideoFrame::new(
            width, height, row_bytes, format,
        ))))
    }

    fn create_ancillary_data(&self, format: PixelFormat) -> Result<AncillaryData> {
        let state = self.state.lock();
        if state.failures.ancillary {
            return Err(Error::Allocation("injected ancillary allocation failure".to_string()));
        }
        let mode = state
            .video_mode
            .as_ref()
            .ok_or_else(|| Error::Device("video output not enabled".to_string()))?;
        let last_line = if mode.height >= 720 { 20 } else { 22 };
        Ok(AncillaryData::new(format, v210_row_bytes(mode.width), 1, last_line))
    }

    fn convert_frame(&self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<()> {
        if dst.format != PixelFormat::Yuv10 {
            return Err(Error::Device(format!("cannot convert into {:?}", dst.format)));
        }
        let (width, height) = (src.width.min(dst.width), src.height.min(dst.height));
        match src.format {
            PixelFormat::Yuv8 => yuv8_to_v210(
                &src.data,
                src.row_bytes,
                &mut dst.data,
                dst.row_bytes,
                width,
                height,
            ),
            PixelFormat::Argb8 => argb8_to_v210(
                &src.data,
                src.row_bytes,
                &mut dst.data,
                dst.row_bytes,
                width,
                height,
            ),
            PixelFormat::Yuv10 => {
                let len = src.data.len().min(dst.data.len());
                dst.data[..len].copy_from_slice(&src.data[..len]);
                Ok(())
            }
        }?;
        dst.vitc = src.vitc;
        dst.user_bits = src.user_bits;
        Ok(())
    }

    fn schedule_video_frame(
        &self,
        frame: SharedFrame,
        display_time: u64,
        duration: u64,
        time_scale: u64,
    ) -> Result<()> {
        let record = {
            let f = frame.lock();
            ScheduleRecord {
                display_time,
                duration,
                time_scale,
                format: f.format,
                vanc_lines: f
                    .ancillary
                    .as_ref()
                    .map(AncillaryData::written_lines)
                    .unwrap_or_default(),
                vitc: f.vitc,
                user_bits: f.user_bits,
            }
        };

        let mut state = self.state.lock();
        if state.video_mode.is_none() {
            return Err(Error::Schedule("video output not enabled".to_string()));
        }
        if state.failures.schedules > 0 {
            state.failures.schedules -= 1;
            return Err(Error::Schedule(format!(
                "injected failure at display time {}",
                display_time
            )));
        }
        state.history.push(record);
        state.scheduled.push_back(frame);
        Ok(())
    }

    fn schedule_audio_samples(
        &self,
        samples: &[i16],
        sample_count: u32,
        stream_time: u64,
        _time_scale: u64,
    ) -> Result<u32> {
        let mut state = self.state.lock();
        if state.audio.is_none() {
            return Err(Error::Device("audio output not enabled".to_string()));
        }
        let written = state
            .failures
            .audio_write_limit
            .map_or(sample_count, |limit| limit.min(sample_count));
        state.audio_history.push(AudioRecord {
            stream_time,
            sample_count,
            written,
            samples: samples.to_vec(),
        });
        Ok(written)
    }

    fn begin_audio_preroll(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.audio.is_none() {
                return Err(Error::Device("audio output not enabled".to_string()));
            }
            state.audio_preroll = true;
        }
        self.request_audio(true);
        Ok(())
    }

    fn start_scheduled_playback(&self, start_time: u64, time_scale: u64, speed: f64) -> Result<()> {
        let mode = {
            let mut state = self.state.lock();
            let Some(mode) = state.video_mode.clone() else {
                return Err(Error::Device("video output not enabled".to_string()));
            };
            if state.playing {
                return Ok(());
            }
            state.playing = true;
            state.audio_preroll = false;
            mode
        };
        info!(
            "{}: scheduled playback started at {}/{} speed {}",
            self.model_name, start_time, time_scale, speed
        );
        if self.completion == CompletionMode::Clocked {
            self.start_clock(&mode);
        }
        Ok(())
    }

    fn stop_scheduled_playback(&self) -> Result<()> {
        self.stop_clock();
        let (flushed, was_playing) = {
            let mut state = self.state.lock();
            let was_playing = std::mem::replace(&mut state.playing, false);
            (std::mem::take(&mut state.scheduled), was_playing)
        };
        let callback = self.callback();
        if let Some(callback) = &callback {
            for frame in flushed {
                callback.scheduled_frame_completed(frame, CompletionResult::Flushed);
            }
        }
        if was_playing {
            self.state.lock().stopped_notifications += 1;
            if let Some(callback) = &callback {
                callback.scheduled_playback_has_stopped();
            }
        }
        Ok(())
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        *self.clock.stop.lock() = true;
        self.clock.wake.notify_all();
    }
}

/// Driver exposing a fixed set of virtual devices
pub struct VirtualDriver {
    devices: Vec<Arc<VirtualDevice>>,
}

impl VirtualDriver {
    pub fn new(devices: Vec<Arc<VirtualDevice>>) -> Self {
        Self { devices }
    }

    /// A driver with one manually completed device
    pub fn single() -> (Self, Arc<VirtualDevice>) {
        let device = VirtualDevice::builder("Virtual Output").build();
        (Self::new(vec![device.clone()]), device)
    }
}

impl DeviceDriver for VirtualDriver {
    fn list_devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.iter().map(|d| d.model_name()).collect())
    }

    fn open(&self, index: u32) -> Result<Arc<dyn OutputDevice>> {
        self.devices
            .get(index as usize)
            .cloned()
            .map(|d| d as Arc<dyn OutputDevice>)
            .ok_or_else(|| Error::Device(format!("no output device at index {}", index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_1080p25() -> DisplayMode {
        DisplayMode::new("HD 1080p 25", 1920, 1080, 1000, 25_000, FieldDominance::Progressive)
    }

    #[test]
    fn test_driver_lists_and_opens() {
        let a = VirtualDevice::builder("Card A").build();
        let b = VirtualDevice::builder("Card B").build();
        let driver = VirtualDriver::new(vec![a, b]);
        assert_eq!(driver.list_devices().unwrap(), vec!["Card A", "Card B"]);
        assert_eq!(driver.open(1).unwrap().model_name(), "Card B");
        assert!(driver.open(2).is_err());
    }

    #[test]
    fn test_schedule_requires_enabled_output() {
        let device = VirtualDevice::builder("Card").build();
        let frame = device
            .create_video_frame(1920, 1080, 3840, PixelFormat::Yuv8)
            .unwrap();
        assert!(device.schedule_video_frame(frame.clone(), 0, 1000, 25_000).is_err());
        device
            .enable_video_output(&mode_1080p25(), VideoOutputFlags::NONE)
            .unwrap();
        device.schedule_video_frame(frame, 0, 1000, 25_000).unwrap();
        assert_eq!(device.scheduled_count(), 1);
        assert_eq!(device.schedule_history()[0].format, PixelFormat::Yuv8);
    }

    #[test]
    fn test_injected_allocation_failures() {
        let device = VirtualDevice::builder("Card").build();
        device.fail_frame_allocations(1);
        assert!(device.create_video_frame(8, 8, 16, PixelFormat::Yuv8).is_err());
        assert!(device.create_video_frame(8, 8, 16, PixelFormat::Yuv8).is_ok());

        device
            .enable_video_output(&mode_1080p25(), VideoOutputFlags::VANC)
            .unwrap();
        device.fail_ancillary_allocation(true);
        assert!(device.create_ancillary_data(PixelFormat::Yuv10).is_err());
        device.fail_ancillary_allocation(false);
        assert!(device.create_ancillary_data(PixelFormat::Yuv10).is_ok());
    }

    #[test]
    fn test_stop_flushes_scheduled_frames() {
        let device = VirtualDevice::builder("Card").build();
        device
            .enable_video_output(&mode_1080p25(), VideoOutputFlags::NONE)
            .unwrap();
        for i in 0..3 {
            let frame = device
                .create_video_frame(1920, 1080, 3840, PixelFormat::Yuv8)
                .unwrap();
            device.schedule_video_frame(frame, i * 1000, 1000, 25_000).unwrap();
        }
        device.start_scheduled_playback(0, 25_000, 1.0).unwrap();
        device.stop_scheduled_playback().unwrap();
        assert_eq!(device.scheduled_count(), 0);
        assert!(!device.is_playing());
        assert_eq!(device.stopped_notifications(), 1);
        device.stop_scheduled_playback().unwrap();
        assert_eq!(device.stopped_notifications(), 1);
    }

    #[test]
    fn test_keyer_state() {
        let device = VirtualDevice::builder("Card").keyer(true).build();
        let keyer = device.keyer().unwrap();
        keyer.enable(true).unwrap();
        keyer.set_level(128).unwrap();
        assert_eq!(
            device.keyer_state(),
            Some(KeyerState {
                enabled: true,
                external: true,
                level: 128
            })
        );
        assert!(VirtualDevice::builder("Plain").build().keyer().is_none());
    }

    #[test]
    fn test_failing_keyer_keeps_state() {
        let device = VirtualDevice::builder("Card").keyer(true).build();
        let keyer = device.keyer().unwrap();
        device.fail_keyer(true);
        assert!(keyer.enable(false).is_err());
        assert!(keyer.set_level(10).is_err());
        assert!(keyer.disable().is_err());
        assert_eq!(device.keyer_state(), Some(KeyerState::default()));
        device.fail_keyer(false);
        assert!(keyer.enable(false).is_ok());
    }

    #[test]
    fn test_clock_ticks_report_lateness() {
        let period = Duration::from_millis(40);
        assert_eq!(tick_result(Duration::ZERO, period), CompletionResult::Displayed);
        assert_eq!(
            tick_result(Duration::from_millis(39), period),
            CompletionResult::Displayed
        );
        assert_eq!(
            tick_result(Duration::from_millis(40), period),
            CompletionResult::DisplayedLate
        );
    }

    #[test]
    fn test_clock_keeps_frame_rate_under_slow_callbacks() {
        struct Slow {
            completed: Mutex<u32>,
        }
        impl OutputCallback for Slow {
            fn scheduled_frame_completed(&self, _frame: SharedFrame, _result: CompletionResult) {
                thread::sleep(Duration::from_millis(9));
                *self.completed.lock() += 1;
            }
            fn render_audio_samples(&self, _preroll: bool) {}
            fn scheduled_playback_has_stopped(&self) {}
        }

        let mode = DisplayMode::new("Fast", 16, 16, 1, 100, FieldDominance::Progressive);
        let device = VirtualDevice::builder("Card")
            .modes(vec![mode.clone()])
            .completion(CompletionMode::Clocked)
            .build();
        let callback = Arc::new(Slow {
            completed: Mutex::new(0),
        });
        let weak: Weak<dyn OutputCallback> = Arc::downgrade(&(callback.clone() as Arc<dyn OutputCallback>));
        device.set_callback(weak);
        device.enable_video_output(&mode, VideoOutputFlags::NONE).unwrap();
        for i in 0..30 {
            let frame = device.create_video_frame(16, 16, 32, PixelFormat::Yuv8).unwrap();
            device.schedule_video_frame(frame, i, 1, 100).unwrap();
        }

        let started = Instant::now();
        device.start_scheduled_playback(0, 100, 1.0).unwrap();
        while device.scheduled_count() > 0 && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        let elapsed = started.elapsed();
        device.stop_scheduled_playback().unwrap();

        assert_eq!(*callback.completed.lock(), 30);
        // Thirty 10 ms ticks; sleeping a full period after each completion
        // would take at least 570 ms
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
    }

    #[test]
    fn test_audio_write_limit() {
        let device = VirtualDevice::builder("Card").build();
        device.enable_audio_output(48_000, 2).unwrap();
        device.limit_audio_writes(Some(100));
        let written = device
            .schedule_audio_samples(&[0; 3840], 1920, 0, 48_000)
            .unwrap();
        assert_eq!(written, 100);
        assert!(device.enable_audio_output(48_000, 3).is_err());
    }
}
