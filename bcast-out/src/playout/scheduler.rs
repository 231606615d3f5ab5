//! Output scheduler core
//!
//! Owns the session lifecycle (open, start, preroll, stop) and reacts to the
//! device callbacks. Every completed frame pulls one new frame from upstream,
//! renders it and schedules it `count` frame durations into the stream, so the
//! device always holds `preroll` frames ahead of the one on air.
//!
//! Lifecycle methods run on the operation serializer's worker. Callbacks run
//! on device threads and only read the current [`Session`] through a cloned
//! `Arc`, so no lock is held while the device is called.

use super::audio::AudioRenderer;
use super::mode::select_display_mode;
use super::pool::FramePool;
use super::priority::{CallbackRole, PriorityElevator};
use super::serializer::{OperationHandler, StopHandle};
use super::session::Session;
use super::stats::{OutputStats, StatsSnapshot};
use super::video::VideoRenderer;
use crate::audio::{device_channels, AudioPayload};
use crate::device::{
    CompletionResult, DeviceDriver, DisplayMode, OutputCallback, OutputDevice, SharedFrame,
    VideoOutputFlags,
};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameSource};
use bcast_common::timing::DEVICE_SAMPLE_RATE;
use bcast_common::{KeyerMode, OutputConfig, OutputEvent};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Fewest frames scheduled before playback starts
pub const PREROLL_MINIMUM: u32 = 3;

const EVENT_CAPACITY: usize = 256;

pub struct OutputScheduler {
    self_ref: Weak<OutputScheduler>,
    config: OutputConfig,
    driver: Arc<dyn DeviceDriver>,
    source: Mutex<Box<dyn FrameSource>>,
    device: RwLock<Option<Arc<dyn OutputDevice>>>,
    session: RwLock<Option<Arc<Session>>>,
    running: AtomicBool,
    count: AtomicU64,
    video: VideoRenderer,
    audio: AudioRenderer,
    priority: PriorityElevator,
    stats: Arc<OutputStats>,
    events: broadcast::Sender<OutputEvent>,
    stop_handle: Mutex<Option<StopHandle>>,
}

impl OutputScheduler {
    /// Build a scheduler; fails only on an unparseable priority hint
    pub fn new(
        config: OutputConfig,
        driver: Arc<dyn DeviceDriver>,
        source: Box<dyn FrameSource>,
    ) -> Result<Arc<Self>> {
        let priority = PriorityElevator::new(config.thread_priority()?);
        let stats = Arc::new(OutputStats::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            driver,
            source: Mutex::new(source),
            device: RwLock::new(None),
            session: RwLock::new(None),
            running: AtomicBool::new(false),
            count: AtomicU64::new(0),
            video: VideoRenderer::new(Arc::clone(&stats)),
            audio: AudioRenderer::new(Arc::clone(&stats)),
            priority,
            stats,
            events,
            stop_handle: Mutex::new(None),
        }))
    }

    /// Handle used by terminate-on-pause to stop without blocking the caller
    pub fn set_stop_handle(&self, handle: StopHandle) {
        *self.stop_handle.lock() = Some(handle);
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames handed to the device so far, including skipped dropped slots
    pub fn frame_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn display_mode(&self) -> Option<DisplayMode> {
        self.session().map(|s| s.mode.clone())
    }

    /// Field order of the running mode; false when progressive or stopped
    pub fn top_field_first(&self) -> bool {
        self.session().is_some_and(|s| s.mode.top_field_first())
    }

    pub fn pool(&self) -> &FramePool {
        self.video.pool()
    }

    pub fn audio_queue_len(&self) -> usize {
        self.audio.len()
    }

    pub fn priority(&self) -> &PriorityElevator {
        &self.priority
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    fn emit(&self, event: OutputEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Open the `card`th device of the driver
    pub fn open(&self, card: i32) -> bool {
        match self.try_open(card) {
            Ok(name) => {
                info!("Opened output device {} ({})", card, name);
                true
            }
            Err(e) => {
                error!("Open of card {} failed: {}", card, e);
                false
            }
        }
    }

    fn try_open(&self, card: i32) -> Result<String> {
        if self.is_running() {
            return Err(Error::InvalidState("output is running".to_string()));
        }
        let index = u32::try_from(card)
            .map_err(|_| Error::InvalidState(format!("invalid card index {}", card)))?;
        let device = self.driver.open(index)?;
        let callback: Weak<dyn OutputCallback> = self.self_ref.clone();
        device.set_callback(callback);
        let name = device.model_name();
        *self.device.write() = Some(device);
        Ok(name)
    }

    /// Negotiate the mode, configure the device and allocate the pool
    ///
    /// Any failure stops whatever was enabled and reports false.
    pub fn start(&self, preroll: i32) -> bool {
        if self.is_running() {
            info!("Restarting running output");
            self.stop();
        }
        let preroll = u32::try_from(preroll).unwrap_or(0).max(PREROLL_MINIMUM);
        match self.try_start(preroll) {
            Ok(()) => true,
            Err(e) => {
                error!("Start failed: {}", e);
                self.abort_start();
                false
            }
        }
    }

    /// Undo a partially completed start
    fn abort_start(&self) {
        self.stop();
        let Some(device) = self.device.read().clone() else {
            return;
        };
        if let Err(e) = device.disable_audio_output() {
            debug!("DisableAudioOutput after failed start: {}", e);
        }
        if let Err(e) = device.disable_video_output() {
            debug!("DisableVideoOutput after failed start: {}", e);
        }
    }

    fn try_start(&self, preroll: u32) -> Result<()> {
        let device = self.device.read().clone().ok_or(Error::NoDevice)?;
        let modes = device.display_modes()?;
        let mode = select_display_mode(&modes, &self.config.profile)?;
        let keyer = self.configure_keyer(device.as_ref());

        let vanc = device.supports_vanc();
        let mut flags = VideoOutputFlags::RP188 | VideoOutputFlags::VITC;
        if vanc {
            flags = flags | VideoOutputFlags::VANC;
        }
        device.enable_video_output(&mode, flags)?;

        let in_channels = self.config.channels;
        let session = Session {
            device: Arc::clone(&device),
            mode,
            preroll,
            keyer,
            audio: !self.config.audio_off,
            in_channels,
            out_channels: device_channels(in_channels),
            vanc,
            terminate_on_pause: self.config.terminate_on_pause,
            sliced_swab: self.config.sliced_swab,
        };

        self.video.pool().allocate(
            device.as_ref(),
            session.pool_size(),
            session.mode.width,
            session.mode.height,
            session.stride(),
            session.pixel_format(),
        )?;

        if session.audio {
            device.enable_audio_output(DEVICE_SAMPLE_RATE, session.out_channels)?;
        }

        info!(
            "Output started in {} ({}x{} {:.2} fps, {}), preroll {}, audio {}",
            session.mode.name,
            session.mode.width,
            session.mode.height,
            session.mode.fps(),
            if keyer { "keyer" } else { "yuv" },
            preroll,
            if session.audio {
                format!("{} -> {} channels", session.in_channels, session.out_channels)
            } else {
                "off".to_string()
            }
        );

        self.audio.drain();
        self.priority.reset();
        self.count.store(0, Ordering::SeqCst);
        *self.session.write() = Some(Arc::new(session));
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Apply the keyer settings; true when output goes through the keyer
    ///
    /// Keyer errors are logged and never stop the output from starting.
    fn configure_keyer(&self, device: &dyn OutputDevice) -> bool {
        let mode = self.config.keyer_mode();
        let Some(keyer) = device.keyer() else {
            if mode.is_enabled() {
                warn!("Keyer requested but {} has none", device.model_name());
            }
            return false;
        };

        if mode.is_enabled() {
            let level = self.config.keyer_level_u8();
            if let Err(e) = keyer.enable(mode == KeyerMode::External) {
                error!("Failed to enable keyer: {}", e);
            } else if let Err(e) = keyer.set_level(level) {
                error!("Failed to set keyer level {}: {}", level, e);
            } else {
                debug!("Keyer enabled ({:?}, level {})", mode, level);
            }
            true
        } else {
            if let Err(e) = keyer.disable() {
                warn!("Failed to disable keyer: {}", e);
            }
            false
        }
    }

    /// Fill the device queue and kick off playback
    pub fn preroll(&self) {
        if !self.is_running() {
            return;
        }
        let Some(session) = self.session() else {
            return;
        };

        for _ in 0..session.preroll {
            self.schedule_next_frame();
        }

        if session.audio {
            if let Err(e) = session.device.begin_audio_preroll() {
                error!("BeginAudioPreroll failed: {}", e);
            }
        } else {
            self.start_playback(&session);
        }
    }

    fn start_playback(&self, session: &Session) {
        let mode = &session.mode;
        match session
            .device
            .start_scheduled_playback(0, mode.time_scale, 1.0)
        {
            Ok(()) => {
                info!("Scheduled playback started");
                self.emit(OutputEvent::PlaybackStarted {
                    width: mode.width,
                    height: mode.height,
                    fps: mode.fps(),
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => error!("StartScheduledPlayback failed: {}", e),
        }
    }

    /// Stop playback, disable outputs and release every buffer
    ///
    /// Safe to call repeatedly.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let session = self.session.write().take();

        if let Some(session) = session {
            let device = &session.device;
            if let Err(e) = device.stop_scheduled_playback() {
                error!("StopScheduledPlayback failed: {}", e);
            }
            if session.audio {
                if let Err(e) = device.disable_audio_output() {
                    error!("DisableAudioOutput failed: {}", e);
                }
            }
            if let Err(e) = device.disable_video_output() {
                error!("DisableVideoOutput failed: {}", e);
            }
        }

        let blocks = self.audio.drain();
        let frames = self.video.pool().drain();
        debug!("Released {} audio blocks and {} frame buffers", blocks, frames);

        if was_running {
            info!("Output stopped after {} frames", self.frame_count());
            self.emit(OutputEvent::stopped());
        }
        true
    }

    /// Pull the next upstream frame and render it
    ///
    /// Upstream misses are retried while output runs, until the source reports
    /// it has nothing more to give.
    pub fn schedule_next_frame(&self) {
        while self.is_running() {
            let pulled = {
                let mut source = self.source.lock();
                source.pull_frame().ok_or_else(|| source.is_exhausted())
            };
            match pulled {
                Ok(frame) => {
                    self.render(frame);
                    return;
                }
                Err(true) => {
                    warn!("Upstream exhausted at frame {}, nothing left to schedule", self.frame_count());
                    OutputStats::inc(&self.stats.upstream_exhausted);
                    return;
                }
                Err(false) => {
                    warn!("No frame from upstream, retrying");
                    OutputStats::inc(&self.stats.upstream_misses);
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Queue the frame's audio, schedule its video and advance the counter
    pub fn render(&self, mut frame: Frame) {
        let Some(session) = self.session() else {
            return;
        };
        let count = self.count.load(Ordering::SeqCst);

        if session.audio && frame.speed == 1.0 {
            let payload = frame
                .audio
                .take()
                .unwrap_or_else(|| AudioPayload::silence(session.in_channels, DEVICE_SAMPLE_RATE, 0));
            self.audio.enqueue(payload, count);
        }

        self.video.render_video(&session, &frame, count);
        let shown = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        OutputStats::inc(&self.stats.frames_rendered);
        trace!("Rendered frame {} (position {})", count, frame.position);
        self.emit(OutputEvent::frame_shown(shown));

        if session.terminate_on_pause && frame.speed == 0.0 {
            info!("Upstream paused at position {}, stopping output", frame.position);
            match self.stop_handle.lock().as_ref() {
                Some(handle) => handle.request_stop(),
                None => warn!("No stop handle registered, ignoring pause"),
            }
        }
    }
}

impl OutputCallback for OutputScheduler {
    fn scheduled_frame_completed(&self, _frame: SharedFrame, result: CompletionResult) {
        self.priority.elevate(CallbackRole::Video);
        self.video.pool().retire_oldest();

        match result {
            CompletionResult::Flushed => {
                OutputStats::inc(&self.stats.frames_flushed);
                return;
            }
            CompletionResult::Displayed => {
                OutputStats::inc(&self.stats.frames_displayed);
            }
            CompletionResult::DisplayedLate => {
                debug!("Frame displayed late at count {}", self.frame_count());
                OutputStats::inc(&self.stats.frames_late);
                self.emit(OutputEvent::frame_late(self.frame_count()));
            }
            CompletionResult::Dropped => {
                OutputStats::inc(&self.stats.frames_dropped);
            }
        }

        self.schedule_next_frame();

        if result == CompletionResult::Dropped && self.is_running() {
            let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("Frame dropped, skipping to count {}", count);
            self.emit(OutputEvent::frame_dropped(count));
            self.schedule_next_frame();
        }
    }

    fn render_audio_samples(&self, preroll: bool) {
        self.priority.elevate(CallbackRole::Audio);
        let Some(session) = self.session() else {
            return;
        };
        if !session.audio {
            return;
        }

        while let Some(block) = self.audio.pop() {
            self.audio.render_block(&session, &block);
            if preroll {
                break;
            }
        }

        if preroll {
            self.start_playback(&session);
        }
    }

    fn scheduled_playback_has_stopped(&self) {
        info!("Device reports scheduled playback stopped");
    }
}

impl OperationHandler for OutputScheduler {
    fn open(&self, card: i32) -> bool {
        OutputScheduler::open(self, card)
    }

    fn start(&self, preroll: i32) -> bool {
        OutputScheduler::start(self, preroll)
    }

    fn stop(&self) -> bool {
        OutputScheduler::stop(self)
    }

    fn preroll(&self) {
        OutputScheduler::preroll(self)
    }
}
