//! Ancillary data encoding
//!
//! Builds closed caption and splice packets for a frame and writes them into
//! the vertical blanking of a 10-bit frame. Failures are reported to the caller
//! but never stop the frame from being scheduled.

pub mod cdp;
pub mod line;
pub mod packet;
pub mod scte104;

pub use cdp::{Cdp, CaptionUnit, MAX_CC_COUNT};
pub use line::{generate_v210_line, LineSet, VancLine};
pub use packet::AncPacket;
pub use scte104::{SpliceEvent, SpliceParser};

use crate::device::{AncillaryData, DisplayMode, OutputDevice, PixelFormat, VideoFrame};
use crate::error::{Error, Result};
use crate::frame::FrameMetadata;
use tracing::{debug, error};

/// Blanking line carrying caption packets
pub const CAPTION_LINE: u32 = 11;
pub const CAPTION_DID: u8 = 0x61;
pub const CAPTION_SDID: u8 = 0x01;

/// Blanking line carrying splice packets
pub const SPLICE_LINE: u32 = 9;
pub const SPLICE_DID: u8 = 0x41;
pub const SPLICE_SDID: u8 = 0x07;

/// Outcome of writing one frame's ancillary lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub lines_written: u32,
    pub lines_failed: u32,
}

/// Per-output ancillary encoder state
#[derive(Debug, Default)]
pub struct AncillaryEncoder {
    cdp_sequence: u16,
    message_number: u8,
    splice: SpliceParser,
}

impl AncillaryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caption line set for the frame; empty when the frame carries no captions
    pub fn caption_lines(&mut self, metadata: &FrameMetadata, mode: &DisplayMode) -> Result<LineSet> {
        let mut lines = LineSet::new();
        let size = metadata.caption_len();
        if size == 0 {
            return Ok(lines);
        }
        let Some(blob) = metadata.captions.as_deref() else {
            return Err(Error::Ancillary(format!(
                "caption size {} but no caption data",
                size
            )));
        };

        let rate = cdp::frame_rate_code(mode.frame_duration, mode.time_scale)?;
        let units = cdp::caption_units(blob, size);
        let sequence = self.cdp_sequence;
        self.cdp_sequence = self.cdp_sequence.wrapping_add(1);

        let bytes = Cdp::new(rate, sequence, units).to_bytes();
        let packet = AncPacket::new(CAPTION_DID, CAPTION_SDID, bytes)?;
        lines.insert(packet.to_words(), CAPTION_LINE);
        Ok(lines)
    }

    /// Splice line set for the frame; empty without a command or with event id 0
    pub fn splice_lines(&mut self, metadata: &FrameMetadata) -> Result<LineSet> {
        let mut lines = LineSet::new();
        let Some(command) = metadata.splice_command() else {
            return Ok(lines);
        };
        let event = self.splice.parse(command);
        if event.event_id == 0 {
            return Ok(lines);
        }

        let message_number = self.message_number;
        self.message_number = self.message_number.wrapping_add(1);
        let packet = AncPacket::new(SPLICE_DID, SPLICE_SDID, event.to_user_data(message_number))?;
        lines.insert(packet.to_words(), SPLICE_LINE);
        Ok(lines)
    }

    /// Write the frame's caption and splice lines into `frame`'s blanking
    ///
    /// Allocates the ancillary buffer through `device` when the frame has none.
    /// Per-line failures are logged and counted; only a failed allocation is an error.
    pub fn encode(
        &mut self,
        metadata: &FrameMetadata,
        mode: &DisplayMode,
        device: &dyn OutputDevice,
        frame: &mut VideoFrame,
    ) -> Result<EncodeReport> {
        if frame.ancillary.is_none() {
            let anc = device
                .create_ancillary_data(PixelFormat::Yuv10)
                .map_err(|e| Error::Ancillary(format!("Failed to create vanc: {}", e)))?;
            frame.ancillary = Some(anc);
        }
        let width = frame.width;
        let Some(anc) = frame.ancillary.as_mut() else {
            return Err(Error::Ancillary("frame has no ancillary buffer".to_string()));
        };

        let mut report = EncodeReport::default();
        match self.caption_lines(metadata, mode) {
            Ok(lines) => insert_lines(anc, &lines, width, &mut report),
            Err(e) => {
                error!("Caption encoding failed: {}", e);
                report.lines_failed += 1;
            }
        }
        match self.splice_lines(metadata) {
            Ok(lines) => insert_lines(anc, &lines, width, &mut report),
            Err(e) => {
                error!("Splice encoding failed: {}", e);
                report.lines_failed += 1;
            }
        }
        Ok(report)
    }
}

/// Render every line of `lines` into the matching blanking buffer
fn insert_lines(anc: &mut AncillaryData, lines: &LineSet, width: u32, report: &mut EncodeReport) {
    for line in lines.lines() {
        let buf = match anc.line_buffer(line.number) {
            Ok(buf) => buf,
            Err(e) => {
                error!("Failed to get VANC line {}: {}", line.number, e);
                report.lines_failed += 1;
                continue;
            }
        };
        match generate_v210_line(line, width, buf) {
            Ok(()) => {
                debug!("Wrote {} VANC words on line {}", line.word_count(), line.number);
                report.lines_written += 1;
            }
            Err(e) => {
                error!("Failed to generate VANC line {}: {}", line.number, e);
                report.lines_failed += 1;
            }
        }
    }
}
