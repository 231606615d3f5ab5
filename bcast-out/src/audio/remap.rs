//! Channel remapping between the upstream layout and the device layout
//!
//! Channels are matched by index. Missing device channels are filled with
//! silence and surplus input channels are dropped.

/// Remap interleaved samples from `in_channels` to `out_channels`
///
/// Output length is always `out_channels * sample_count`. Input shorter than
/// `in_channels * sample_count` is treated as trailing silence.
pub fn remap_channels(
    input: &[i16],
    in_channels: u16,
    out_channels: u16,
    sample_count: usize,
) -> Vec<i16> {
    let in_ch = in_channels as usize;
    let out_ch = out_channels as usize;

    if in_ch == out_ch && input.len() == in_ch * sample_count {
        return input.to_vec();
    }

    let mut output = vec![0i16; out_ch * sample_count];
    if in_ch == 0 {
        return output;
    }

    let copy = in_ch.min(out_ch);
    for (dst, src) in output
        .chunks_exact_mut(out_ch.max(1))
        .zip(input.chunks_exact(in_ch))
    {
        dst[..copy].copy_from_slice(&src[..copy]);
    }
    output
}
