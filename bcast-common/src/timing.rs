//! Frame and audio sample timing arithmetic
//!
//! All audio is delivered to the device at 48 kHz. Per-frame sample counts are
//! derived from the cumulative sample position so that fractional rates such as
//! 29.97 fps never accumulate drift: frame `n` carries
//! `samples_to_now(n + 1) - samples_to_now(n)` samples.

/// Device audio sample rate
pub const DEVICE_SAMPLE_RATE: u32 = 48_000;

/// Cumulative samples elapsed at the start of frame `position`, rounded to nearest
pub fn samples_to_now(position: u64, frequency: u32, fps_num: u64, fps_den: u64) -> u64 {
    if fps_num == 0 {
        return 0;
    }
    let numerator = position as u128 * frequency as u128 * fps_den as u128;
    let denominator = fps_num as u128;
    ((2 * numerator + denominator) / (2 * denominator)) as u64
}

/// Samples carried by frame `position`
///
/// The rate is `fps_num / fps_den`; a display mode passes its time scale and
/// frame duration.
pub fn frame_samples(position: u64, frequency: u32, fps_num: u64, fps_den: u64) -> u32 {
    let next = samples_to_now(position + 1, frequency, fps_num, fps_den);
    let now = samples_to_now(position, frequency, fps_num, fps_den);
    (next - now) as u32
}

/// Audio stream time for frame `count` in 48 kHz ticks
///
/// `frame_duration` and `time_scale` come from the selected display mode.
pub fn audio_stream_time(count: u64, frame_duration: u64, time_scale: u64) -> u64 {
    if time_scale == 0 {
        return 0;
    }
    (count as u128 * DEVICE_SAMPLE_RATE as u128 * frame_duration as u128 / time_scale as u128)
        as u64
}

/// Video stream time for frame `count` in device time-scale units
pub fn video_stream_time(count: u64, frame_duration: u64) -> u64 {
    count * frame_duration
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_rate_samples() {
        assert_eq!(frame_samples(0, 48_000, 25, 1), 1920);
        assert_eq!(frame_samples(99, 48_000, 50, 1), 960);
    }

    #[test]
    fn test_ntsc_cadence_sums_exactly() {
        // 30000/1001 → 1601.6 samples per frame, five-frame cadence of 8008
        let total: u64 = (0..5)
            .map(|n| frame_samples(n, 48_000, 30_000, 1001) as u64)
            .sum();
        assert_eq!(total, 8008);
        for n in 0..5 {
            let s = frame_samples(n, 48_000, 30_000, 1001);
            assert!(s == 1601 || s == 1602, "frame {} had {} samples", n, s);
        }
    }

    #[test]
    fn test_stream_times() {
        // 25p mode: duration 1000, scale 25000
        assert_eq!(audio_stream_time(3, 1000, 25_000), 3 * 1920);
        assert_eq!(video_stream_time(3, 1000), 3000);
        assert_eq!(audio_stream_time(3, 1000, 0), 0);
    }
}
