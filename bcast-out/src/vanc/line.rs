//! Vertical blanking line assembly
//!
//! Packets destined for the same line are collected in a [`LineSet`] and then
//! rendered into a v210 line buffer. HD rasters carry packets in the luma
//! samples only; SD rasters use every sample.

use crate::error::{Error, Result};
use crate::video::convert::pack_v210;

/// Luma value of an idle blanking sample
pub const BLANK_LUMA: u16 = 0x040;
/// Chroma value of an idle blanking sample
pub const BLANK_CHROMA: u16 = 0x200;

/// Widest raster that is treated as SD
const SD_MAX_WIDTH: u32 = 720;

/// Packets queued for one blanking line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VancLine {
    pub number: u32,
    packets: Vec<Vec<u16>>,
}

impl VancLine {
    pub fn packets(&self) -> &[Vec<u16>] {
        &self.packets
    }

    /// Total words across all packets on the line
    pub fn word_count(&self) -> usize {
        self.packets.iter().map(Vec::len).sum()
    }
}

/// Blanking lines built for one frame
#[derive(Debug, Default)]
pub struct LineSet {
    lines: Vec<VancLine>,
}

impl LineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet on `line`, after any packets already there
    pub fn insert(&mut self, words: Vec<u16>, line: u32) {
        match self.lines.iter_mut().find(|l| l.number == line) {
            Some(existing) => existing.packets.push(words),
            None => self.lines.push(VancLine {
                number: line,
                packets: vec![words],
            }),
        }
    }

    pub fn lines(&self) -> &[VancLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Render a line's packets into a v210 buffer for a raster `width` pixels wide
pub fn generate_v210_line(line: &VancLine, width: u32, dst: &mut [u8]) -> Result<()> {
    let sample_count = width as usize * 2;
    let mut components: Vec<u16> = (0..sample_count)
        .map(|i| if i % 2 == 0 { BLANK_CHROMA } else { BLANK_LUMA })
        .collect();

    let hd = width > SD_MAX_WIDTH;
    let (start, step) = if hd { (1, 2) } else { (0, 1) };
    let capacity = (sample_count - start + step - 1) / step;

    let words: Vec<u16> = line.packets.iter().flatten().copied().collect();
    if words.len() > capacity {
        return Err(Error::Ancillary(format!(
            "line {} needs {} words but only {} fit",
            line.number,
            words.len(),
            capacity
        )));
    }

    for (slot, word) in components
        .iter_mut()
        .skip(start)
        .step_by(step)
        .zip(words)
    {
        *slot = word;
    }

    pack_v210(&components, dst);
    Ok(())
}
