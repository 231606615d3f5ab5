//! Audio block queue and device delivery

use super::session::Session;
use super::stats::OutputStats;
use crate::audio::{convert_for_device, AudioBlock, AudioPayload};
use bcast_common::timing::{audio_stream_time, frame_samples, DEVICE_SAMPLE_RATE};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error};

/// FIFO of audio blocks waiting for the device audio callback
pub struct AudioRenderer {
    queue: Mutex<VecDeque<AudioBlock>>,
    stats: Arc<OutputStats>,
}

impl AudioRenderer {
    pub fn new(stats: Arc<OutputStats>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            stats,
        }
    }

    /// Queue audio for the frame at video counter `sequence`
    pub fn enqueue(&self, payload: AudioPayload, sequence: u64) {
        self.queue.lock().push_back(AudioBlock { payload, sequence });
    }

    pub fn pop(&self) -> Option<AudioBlock> {
        self.queue.lock().pop_front()
    }

    /// Discard everything queued; returns the number of blocks dropped
    pub fn drain(&self) -> usize {
        let mut queue = self.queue.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert one block and schedule it at its place on the 48 kHz timeline
    pub fn render_block(&self, session: &Session, block: &AudioBlock) {
        let mode = &session.mode;
        let sample_count = frame_samples(
            block.sequence,
            DEVICE_SAMPLE_RATE,
            mode.time_scale,
            mode.frame_duration,
        );

        let samples = match convert_for_device(&block.payload, sample_count as usize, session.out_channels) {
            Ok(samples) => samples,
            Err(e) => {
                error!("Audio block {} dropped: {}", block.sequence, e);
                OutputStats::inc(&self.stats.audio_failures);
                return;
            }
        };

        let stream_time = audio_stream_time(block.sequence, mode.frame_duration, mode.time_scale);
        match session.device.schedule_audio_samples(
            &samples,
            sample_count,
            stream_time,
            DEVICE_SAMPLE_RATE as u64,
        ) {
            Ok(written) => {
                OutputStats::inc(&self.stats.audio_blocks);
                if written != sample_count {
                    debug!(
                        "ScheduleAudioSamples wrote {} of {} samples at {}",
                        written, sample_count, stream_time
                    );
                    OutputStats::inc(&self.stats.audio_short_writes);
                }
            }
            Err(e) => {
                error!("ScheduleAudioSamples failed at {}: {}", stream_time, e);
                OutputStats::inc(&self.stats.audio_failures);
            }
        }
    }
}
