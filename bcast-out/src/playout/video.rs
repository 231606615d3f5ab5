//! Video frame rendering and scheduling

use super::pool::FramePool;
use super::session::Session;
use super::stats::OutputStats;
use crate::device::{PixelFormat, SharedFrame, VideoFrame};
use crate::frame::{Frame, FrameImage};
use crate::vanc::AncillaryEncoder;
use crate::video::convert::{blank_ntsc_lines, rgba_to_argb, swab, swab_sliced, v210_row_bytes};
use bcast_common::timing::video_stream_time;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Fills pool buffers from upstream frames and hands them to the device
///
/// Pool buffers are 8-bit. On a VANC-capable device a frame carrying captions
/// or a splice cue is scheduled as a transient 10-bit copy with its blanking
/// lines filled, so one session mixes 8-bit and 10-bit frames. Frames without
/// ancillary data skip the conversion and go out as the 8-bit pool buffer.
pub struct VideoRenderer {
    pool: FramePool,
    encoder: Mutex<AncillaryEncoder>,
    stats: Arc<OutputStats>,
}

impl VideoRenderer {
    pub fn new(stats: Arc<OutputStats>) -> Self {
        Self {
            pool: FramePool::new(),
            encoder: Mutex::new(AncillaryEncoder::new()),
            stats,
        }
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Render `frame` into a free buffer and schedule it at `count` frame durations
    pub fn render_video(&self, session: &Session, frame: &Frame, count: u64) {
        let Some(buffer) = self.pool.pop_ready() else {
            warn!("No free video buffer for frame {}", count);
            OutputStats::inc(&self.stats.buffer_underruns);
            return;
        };

        let fresh = {
            let mut out = buffer.lock();
            out.clear_signaling();
            let fresh = match usable_image(session, frame) {
                Some(image) => {
                    copy_image(session, frame, image, &mut out);
                    true
                }
                None => {
                    self.repeat_last(&buffer, &mut out);
                    false
                }
            };
            out.vitc = frame.metadata.vitc();
            out.user_bits = frame.metadata.user_bits();
            fresh
        };
        if fresh {
            self.pool.set_last_rendered(&buffer);
        } else {
            OutputStats::inc(&self.stats.frames_repeated);
        }

        let with_vanc = if session.vanc && frame.metadata.has_ancillary() {
            self.ancillary_copy(session, frame, &buffer)
        } else {
            None
        };
        let scheduled = with_vanc.unwrap_or_else(|| Arc::clone(&buffer));

        let duration = session.mode.frame_duration;
        let display_time = video_stream_time(count, duration);
        match session.device.schedule_video_frame(
            scheduled,
            display_time,
            duration,
            session.mode.time_scale,
        ) {
            Ok(()) => {
                self.pool.push_in_flight(buffer);
                OutputStats::inc(&self.stats.frames_scheduled);
                debug!("Scheduled frame {} at {}", count, display_time);
            }
            Err(e) => {
                error!("ScheduleVideoFrame failed for frame {}: {}", count, e);
                OutputStats::inc(&self.stats.schedule_failures);
                self.pool.push_ready(buffer);
            }
        }
    }

    /// Copy the last real picture into `out` unless `buffer` already holds it
    fn repeat_last(&self, buffer: &SharedFrame, out: &mut VideoFrame) {
        let Some(last) = self.pool.last_rendered() else {
            return;
        };
        if Arc::ptr_eq(&last, buffer) {
            return;
        }
        let last = last.lock();
        let len = last.data.len().min(out.data.len());
        out.data[..len].copy_from_slice(&last.data[..len]);
    }

    /// 10-bit copy of `buffer` carrying the frame's ancillary data
    ///
    /// `None` means the 8-bit buffer should be scheduled as is.
    fn ancillary_copy(&self, session: &Session, frame: &Frame, buffer: &SharedFrame) -> Option<SharedFrame> {
        let device = &session.device;
        let (width, height) = (session.mode.width, session.mode.height);
        let ten_bit = match device.create_video_frame(
            width,
            height,
            v210_row_bytes(width),
            PixelFormat::Yuv10,
        ) {
            Ok(f) => f,
            Err(e) => {
                error!("CreateVideoFrame (10-bit) failed: {}", e);
                return None;
            }
        };

        {
            let src = buffer.lock();
            let mut dst = ten_bit.lock();
            if let Err(e) = device.convert_frame(&src, &mut dst) {
                debug!("ConvertFrame failed: {}", e);
                return None;
            }
            drop(src);

            let mut encoder = self.encoder.lock();
            match encoder.encode(&frame.metadata, &session.mode, device.as_ref(), &mut dst) {
                Ok(report) => {
                    OutputStats::add(&self.stats.ancillary_lines_written, report.lines_written as u64);
                    OutputStats::add(&self.stats.ancillary_lines_failed, report.lines_failed as u64);
                }
                Err(e) => {
                    error!("Ancillary data for frame {} skipped: {}", frame.position, e);
                    OutputStats::inc(&self.stats.ancillary_failures);
                }
            }
        }
        Some(ten_bit)
    }
}

/// The frame's picture if it can be placed in this session's buffers
fn usable_image<'a>(session: &Session, frame: &'a Frame) -> Option<&'a FrameImage> {
    let image = frame.renderable_image()?;
    if image.format != session.image_format() || image.width != session.mode.width {
        warn!(
            "Frame {} image {:?} {}x{} does not fit {:?} output {}x{}",
            frame.position,
            image.format,
            image.width,
            image.height,
            session.image_format(),
            session.mode.width,
            session.mode.height
        );
        return None;
    }
    Some(image)
}

/// Write an upstream picture into a device buffer
pub fn copy_image(session: &Session, frame: &Frame, image: &FrameImage, out: &mut VideoFrame) {
    let stride = session.stride();
    let offset = if session.mode.height == 486 && image.height == 480 {
        blank_ntsc_lines(&mut out.data, stride, session.keyer)
    } else {
        0
    };

    let dst = &mut out.data[offset..];
    let size = (stride * image.height as usize)
        .min(image.data.len())
        .min(dst.len());
    let (src, dst) = (&image.data[..size], &mut dst[..size]);

    if !session.keyer {
        if session.sliced_swab {
            swab_sliced(src, dst, rayon::current_num_threads());
        } else {
            swab(src, dst);
        }
    } else if !frame.test_image {
        rgba_to_argb(src, dst);
    } else {
        dst.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::virtual_device::standard_modes;
    use crate::device::{OutputDevice, VideoOutputFlags, VirtualDevice};
    use crate::frame::ImageFormat;

    fn session(device: Arc<VirtualDevice>, mode_name: &str, keyer: bool) -> Session {
        let mode = standard_modes()
            .into_iter()
            .find(|m| m.name == mode_name)
            .unwrap();
        device.enable_video_output(&mode, VideoOutputFlags::VANC).unwrap();
        Session {
            device,
            mode,
            preroll: 3,
            keyer,
            audio: false,
            in_channels: 2,
            out_channels: 2,
            vanc: true,
            terminate_on_pause: false,
            sliced_swab: false,
        }
    }

    fn yuv_frame(width: u32, height: u32, value: u8) -> Frame {
        let image = FrameImage::new(width, height, ImageFormat::Yuv422, vec![value; (width * height * 2) as usize]);
        Frame::new(0, Some(image), None)
    }

    #[test]
    fn test_ntsc_image_is_offset_below_blanking() {
        let device = VirtualDevice::builder("Card").build();
        let session = session(device, "NTSC", false);
        let mut out = VideoFrame::new(720, 486, 1440, PixelFormat::Yuv8);
        let mut frame = yuv_frame(720, 480, 0);
        if let Some(image) = frame.image.as_mut() {
            image.data[0] = 0x10;
            image.data[1] = 0x80;
        }
        let image = frame.image.clone().unwrap();
        copy_image(&session, &frame, &image, &mut out);
        assert_eq!(&out.data[..2], &[128, 16]);
        let start = 1440 * 6;
        assert_eq!(&out.data[start..start + 2], &[0x80, 0x10]);
    }

    #[test]
    fn test_keyer_test_image_is_transparent() {
        let device = VirtualDevice::builder("Card").build();
        let session = session(device, "HD 1080p 25", true);
        let image = FrameImage::new(1920, 2, ImageFormat::Rgba, vec![0xFF; 1920 * 2 * 4]);
        let mut frame = Frame::new(0, Some(image.clone()), None);
        frame.test_image = true;
        let mut out = VideoFrame::new(1920, 2, 1920 * 4, PixelFormat::Argb8);
        out.data.fill(7);
        copy_image(&session, &frame, &image, &mut out);
        assert!(out.data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_unrendered_frame_repeats_last_picture() {
        let device = VirtualDevice::builder("Card").build();
        let session = session(device.clone(), "HD 1080p 25", false);
        let stats = Arc::new(OutputStats::new());
        let renderer = VideoRenderer::new(stats.clone());
        renderer
            .pool()
            .allocate(&*device, 5, 1920, 1080, 3840, PixelFormat::Yuv8)
            .unwrap();

        renderer.render_video(&session, &yuv_frame(1920, 1080, 0x33), 0);
        let mut skipped = yuv_frame(1920, 1080, 0x99);
        skipped.rendered = false;
        renderer.render_video(&session, &skipped, 1);

        assert_eq!(stats.snapshot().frames_repeated, 1);
        assert_eq!(renderer.pool().in_flight_len(), 2);
        let history = device.schedule_history();
        assert_eq!(history[1].display_time, 1000);

        // Cycle both in-flight buffers to the front of the ready queue
        let pool = renderer.pool();
        let spare: Vec<_> = std::iter::from_fn(|| pool.pop_ready()).collect();
        assert_eq!(spare.len(), 3);
        assert!(pool.retire_oldest());
        assert!(pool.retire_oldest());
        let first = pool.pop_ready().unwrap();
        let second = pool.pop_ready().unwrap();
        assert!(Arc::ptr_eq(&first, &pool.last_rendered().unwrap()));
        assert_eq!(second.lock().data[0], 0x33);
        assert_eq!(second.lock().data[1], 0x33);
    }

    #[test]
    fn test_schedule_failure_returns_buffer() {
        let device = VirtualDevice::builder("Card").build();
        let session = session(device.clone(), "HD 1080p 25", false);
        let stats = Arc::new(OutputStats::new());
        let renderer = VideoRenderer::new(stats.clone());
        renderer
            .pool()
            .allocate(&*device, 5, 1920, 1080, 3840, PixelFormat::Yuv8)
            .unwrap();
        device.fail_schedules(1);
        renderer.render_video(&session, &yuv_frame(1920, 1080, 1), 0);
        assert_eq!(renderer.pool().ready_len(), 5);
        assert_eq!(renderer.pool().in_flight_len(), 0);
        assert_eq!(stats.snapshot().schedule_failures, 1);
    }

    #[test]
    fn test_captions_schedule_ten_bit_copy() {
        let device = VirtualDevice::builder("Card").build();
        let session = session(device.clone(), "HD 1080i 59.94", false);
        let stats = Arc::new(OutputStats::new());
        let renderer = VideoRenderer::new(stats.clone());
        renderer
            .pool()
            .allocate(&*device, 5, 1920, 1080, 3840, PixelFormat::Yuv8)
            .unwrap();

        let mut frame = yuv_frame(1920, 1080, 0x40);
        frame.metadata.caption_size = Some("3".to_string());
        frame.metadata.captions = Some(vec![0xFC, 0x94, 0x2C]);
        frame.metadata.timecode = Some("01:00:00:00".to_string());
        renderer.render_video(&session, &frame, 0);

        let record = &device.schedule_history()[0];
        assert_eq!(record.format, PixelFormat::Yuv10);
        assert_eq!(record.vanc_lines, vec![crate::vanc::CAPTION_LINE]);
        assert!(record.vitc.is_some());
        assert_eq!(stats.snapshot().ancillary_lines_written, 1);
        // The pool buffer, not the 10-bit copy, is tracked as in flight
        assert_eq!(renderer.pool().in_flight_len(), 1);
    }
}
