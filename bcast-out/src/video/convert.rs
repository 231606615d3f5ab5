//! Pixel conversions between upstream images and device buffers

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Sliced swab boundaries are aligned to 2^5 bytes
const SLICE_ALIGN: usize = 1 << 5;

/// Lines blanked when a 480-line picture is placed in a 486-line raster
pub const NTSC_BLANK_LINES: usize = 6;

/// Row bytes of a v210 line: 48 pixels pack into 128 bytes
pub fn v210_row_bytes(width: u32) -> usize {
    ((width as usize + 47) / 48) * 128
}

/// Swap each byte pair (Y0 Cb Y1 Cr becomes Cb Y0 Cr Y1)
pub fn swab(src: &[u8], dst: &mut [u8]) {
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        d[0] = s[1];
        d[1] = s[0];
    }
}

/// Byte-pair swap split across `jobs` rayon workers
pub fn swab_sliced(src: &[u8], dst: &mut [u8], jobs: usize) {
    let size = src.len().min(dst.len());
    let slice = sliced_swab_size(size, jobs);
    if slice == 0 {
        return;
    }
    dst[..size]
        .par_chunks_mut(slice)
        .zip(src[..size].par_chunks(slice))
        .for_each(|(d, s)| swab(s, d));
}

/// Bytes handled by each worker, rounded up to the slice alignment
pub fn sliced_swab_size(size: usize, jobs: usize) -> usize {
    let jobs = jobs.max(1);
    let per_job = (size + jobs - 1) / jobs;
    (per_job + SLICE_ALIGN - 1) / SLICE_ALIGN * SLICE_ALIGN
}

/// Blank the first NTSC lines; returns the number of bytes written
pub fn blank_ntsc_lines(dst: &mut [u8], stride: usize, keyer: bool) -> usize {
    let len = (stride * NTSC_BLANK_LINES).min(dst.len());
    if keyer {
        dst[..len].fill(0);
    } else {
        for pair in dst[..len].chunks_exact_mut(2) {
            pair[0] = 128;
            pair[1] = 16;
        }
    }
    len
}

/// Move alpha from last to first position (RGBA becomes ARGB)
pub fn rgba_to_argb(src: &[u8], dst: &mut [u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let pixel = u32::from_le_bytes([s[0], s[1], s[2], s[3]]).rotate_left(8);
        d.copy_from_slice(&pixel.to_le_bytes());
    }
}

/// Pack 10-bit components three per little-endian word
///
/// Components are taken in v210 stream order (Cb Y Cr Y ...). Bytes of `dst`
/// past the packed words are zeroed.
pub fn pack_v210(components: &[u16], dst: &mut [u8]) {
    let mut written = 0;
    for (word, out) in components.chunks(3).zip(dst.chunks_exact_mut(4)) {
        let mut value = 0u32;
        for (i, component) in word.iter().enumerate() {
            value |= ((*component as u32) & 0x3FF) << (10 * i);
        }
        out.copy_from_slice(&value.to_le_bytes());
        written += 4;
    }
    dst[written..].fill(0);
}

fn check_len(what: &str, have: usize, need: usize) -> Result<()> {
    if have < need {
        return Err(Error::Device(format!(
            "{} buffer too small: {} < {}",
            what, have, need
        )));
    }
    Ok(())
}

/// Convert 8-bit Cb Y Cr Y rows to v210
pub fn yuv8_to_v210(
    src: &[u8],
    src_row_bytes: usize,
    dst: &mut [u8],
    dst_row_bytes: usize,
    width: u32,
    height: u32,
) -> Result<()> {
    let line_bytes = width as usize * 2;
    check_len("source", src.len(), src_row_bytes * height as usize)?;
    check_len("destination", dst.len(), dst_row_bytes * height as usize)?;
    check_len("source row", src_row_bytes, line_bytes)?;

    let mut components = vec![0u16; line_bytes];
    for (src_line, dst_line) in src
        .chunks_exact(src_row_bytes)
        .zip(dst.chunks_exact_mut(dst_row_bytes))
        .take(height as usize)
    {
        for (c, s) in components.iter_mut().zip(&src_line[..line_bytes]) {
            *c = (*s as u16) << 2;
        }
        pack_v210(&components, dst_line);
    }
    Ok(())
}

/// BT.709 studio-range luma/chroma in 10 bits from 8-bit RGB
fn rgb_to_ycbcr10(r: u8, g: u8, b: u8) -> (u16, u16, u16) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 64.0 + (0.2126 * r + 0.7152 * g + 0.0722 * b) * 876.0 / 255.0;
    let cb = 512.0 + (-0.1146 * r - 0.3854 * g + 0.5 * b) * 896.0 / 255.0;
    let cr = 512.0 + (0.5 * r - 0.4542 * g - 0.0458 * b) * 896.0 / 255.0;
    (
        y.round().clamp(4.0, 1019.0) as u16,
        cb.round().clamp(4.0, 1019.0) as u16,
        cr.round().clamp(4.0, 1019.0) as u16,
    )
}

/// Convert 8-bit ARGB rows to v210, discarding alpha
pub fn argb8_to_v210(
    src: &[u8],
    src_row_bytes: usize,
    dst: &mut [u8],
    dst_row_bytes: usize,
    width: u32,
    height: u32,
) -> Result<()> {
    let pixels = width as usize;
    check_len("source", src.len(), src_row_bytes * height as usize)?;
    check_len("destination", dst.len(), dst_row_bytes * height as usize)?;
    check_len("source row", src_row_bytes, pixels * 4)?;

    let mut components = vec![0u16; pixels * 2];
    for (src_line, dst_line) in src
        .chunks_exact(src_row_bytes)
        .zip(dst.chunks_exact_mut(dst_row_bytes))
        .take(height as usize)
    {
        for (pair_idx, pair) in src_line[..pixels * 4].chunks(8).enumerate() {
            let (y0, cb0, cr0) = rgb_to_ycbcr10(pair[1], pair[2], pair[3]);
            let (y1, cb1, cr1) = if pair.len() == 8 {
                rgb_to_ycbcr10(pair[5], pair[6], pair[7])
            } else {
                (y0, cb0, cr0)
            };
            let base = pair_idx * 4;
            components[base] = (cb0 + cb1) / 2;
            components[base + 1] = y0;
            if base + 2 < components.len() {
                components[base + 2] = (cr0 + cr1) / 2;
            }
            if base + 3 < components.len() {
                components[base + 3] = y1;
            }
        }
        pack_v210(&components, dst_line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v210_row_bytes() {
        assert_eq!(v210_row_bytes(720), 1920);
        assert_eq!(v210_row_bytes(1280), 3456);
        assert_eq!(v210_row_bytes(1920), 5120);
    }

    #[test]
    fn test_swab() {
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        swab(&src, &mut dst);
        assert_eq!(dst, [2, 1, 4, 3, 6, 5]);
    }

    #[test]
    fn test_sliced_swab_matches_plain() {
        let src: Vec<u8> = (0..10_000u32).map(|v| (v % 251) as u8).collect();
        let mut plain = vec![0u8; src.len()];
        let mut sliced = vec![0u8; src.len()];
        swab(&src, &mut plain);
        swab_sliced(&src, &mut sliced, 7);
        assert_eq!(plain, sliced);
    }

    #[test]
    fn test_slice_size_aligned() {
        assert_eq!(sliced_swab_size(1000, 3), 352);
        assert_eq!(sliced_swab_size(64, 1), 64);
        assert_eq!(sliced_swab_size(0, 4), 0);
        assert_eq!(sliced_swab_size(100, 0) % 32, 0);
    }

    #[test]
    fn test_ntsc_blanking() {
        let stride = 720 * 2;
        let mut yuv = vec![0xAAu8; stride * 8];
        assert_eq!(blank_ntsc_lines(&mut yuv, stride, false), stride * 6);
        assert_eq!(&yuv[..4], &[128, 16, 128, 16]);
        assert_eq!(yuv[stride * 6], 0xAA);

        let stride = 720 * 4;
        let mut argb = vec![0xAAu8; stride * 8];
        blank_ntsc_lines(&mut argb, stride, true);
        assert!(argb[..stride * 6].iter().all(|b| *b == 0));
        assert_eq!(argb[stride * 6], 0xAA);
    }

    #[test]
    fn test_rgba_to_argb() {
        let src = [10u8, 20, 30, 255, 1, 2, 3, 4];
        let mut dst = [0u8; 8];
        rgba_to_argb(&src, &mut dst);
        assert_eq!(dst, [255, 10, 20, 30, 4, 1, 2, 3]);
    }

    #[test]
    fn test_pack_v210_word_layout() {
        let mut dst = [0xFFu8; 8];
        pack_v210(&[0x200, 0x040, 0x3FF], &mut dst);
        let word = u32::from_le_bytes([dst[0], dst[1], dst[2], dst[3]]);
        assert_eq!(word & 0x3FF, 0x200);
        assert_eq!((word >> 10) & 0x3FF, 0x040);
        assert_eq!((word >> 20) & 0x3FF, 0x3FF);
        assert_eq!(&dst[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_yuv8_black_to_v210() {
        let width = 48;
        let src: Vec<u8> = [128u8, 16].repeat(width);
        let row = v210_row_bytes(width as u32);
        let mut dst = vec![0u8; row];
        yuv8_to_v210(&src, width * 2, &mut dst, row, width as u32, 1).unwrap();
        let word = u32::from_le_bytes([dst[0], dst[1], dst[2], dst[3]]);
        assert_eq!(word & 0x3FF, 512);
        assert_eq!((word >> 10) & 0x3FF, 64);
        assert_eq!((word >> 20) & 0x3FF, 512);
    }

    #[test]
    fn test_argb_white_to_v210() {
        let src = [255u8, 255, 255, 255].repeat(6);
        let row = v210_row_bytes(6);
        let mut dst = vec![0u8; row];
        argb8_to_v210(&src, 24, &mut dst, row, 6, 1).unwrap();
        let word = u32::from_le_bytes([dst[0], dst[1], dst[2], dst[3]]);
        assert_eq!((word >> 10) & 0x3FF, 940);
        assert_eq!(word & 0x3FF, 512);
    }

    #[test]
    fn test_conversion_rejects_short_buffers() {
        let mut dst = vec![0u8; 10];
        assert!(yuv8_to_v210(&[0; 4], 4, &mut dst, 128, 2, 1).is_err());
    }
}
