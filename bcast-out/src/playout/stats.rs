//! Output counters
//!
//! Updated from the device callback threads with relaxed atomics only; a
//! snapshot can be taken from any thread.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live output counters
#[derive(Debug, Default)]
pub struct OutputStats {
    pub frames_rendered: AtomicU64,
    pub frames_scheduled: AtomicU64,
    pub frames_displayed: AtomicU64,
    pub frames_late: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_flushed: AtomicU64,
    pub frames_repeated: AtomicU64,
    pub schedule_failures: AtomicU64,
    pub buffer_underruns: AtomicU64,
    pub upstream_misses: AtomicU64,
    pub upstream_exhausted: AtomicU64,
    pub audio_blocks: AtomicU64,
    pub audio_short_writes: AtomicU64,
    pub audio_failures: AtomicU64,
    pub ancillary_lines_written: AtomicU64,
    pub ancillary_lines_failed: AtomicU64,
    pub ancillary_failures: AtomicU64,
}

/// Point-in-time copy of [`OutputStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_rendered: u64,
    pub frames_scheduled: u64,
    pub frames_displayed: u64,
    pub frames_late: u64,
    pub frames_dropped: u64,
    pub frames_flushed: u64,
    pub frames_repeated: u64,
    pub schedule_failures: u64,
    pub buffer_underruns: u64,
    pub upstream_misses: u64,
    pub upstream_exhausted: u64,
    pub audio_blocks: u64,
    pub audio_short_writes: u64,
    pub audio_failures: u64,
    pub ancillary_lines_written: u64,
    pub ancillary_lines_failed: u64,
    pub ancillary_failures: u64,
}

impl OutputStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_rendered: get(&self.frames_rendered),
            frames_scheduled: get(&self.frames_scheduled),
            frames_displayed: get(&self.frames_displayed),
            frames_late: get(&self.frames_late),
            frames_dropped: get(&self.frames_dropped),
            frames_flushed: get(&self.frames_flushed),
            frames_repeated: get(&self.frames_repeated),
            schedule_failures: get(&self.schedule_failures),
            buffer_underruns: get(&self.buffer_underruns),
            upstream_misses: get(&self.upstream_misses),
            upstream_exhausted: get(&self.upstream_exhausted),
            audio_blocks: get(&self.audio_blocks),
            audio_short_writes: get(&self.audio_short_writes),
            audio_failures: get(&self.audio_failures),
            ancillary_lines_written: get(&self.ancillary_lines_written),
            ancillary_lines_failed: get(&self.ancillary_lines_failed),
            ancillary_failures: get(&self.ancillary_failures),
        }
    }
}
