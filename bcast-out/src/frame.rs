//! Upstream frame model
//!
//! Frames are produced by the rendering pipeline and pulled by the scheduler
//! whenever the device needs another picture.

use crate::audio::AudioPayload;
use bcast_common::timecode::{parse_user_bits, Timecode};

/// Layout of an upstream image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 8-bit 4:2:2 in Y0 Cb Y1 Cr byte order
    Yuv422,
    /// 8-bit RGBA, one byte per component
    Rgba,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageFormat::Yuv422 => 2,
            ImageFormat::Rgba => 4,
        }
    }
}

/// A rendered picture
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

impl FrameImage {
    pub fn new(width: u32, height: u32, format: ImageFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// Per-frame signaling carried alongside the picture
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    /// Declared caption payload size in bytes (three bytes per caption unit)
    pub caption_size: Option<String>,
    /// Raw caption triples
    pub captions: Option<Vec<u8>>,
    /// Splice command, e.g. `-insert_type 1 -pre_roll 4000`
    pub splice: Option<String>,
    /// VITC timecode markup `HH:MM:SS:FF`
    pub timecode: Option<String>,
    /// VITC user bits
    pub timecode_user_bits: Option<String>,
}

impl FrameMetadata {
    /// Caption payload size; absent, empty or unparsable means zero
    pub fn caption_len(&self) -> usize {
        self.caption_size
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }

    pub fn splice_command(&self) -> Option<&str> {
        self.splice.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn vitc(&self) -> Option<Timecode> {
        self.timecode.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn user_bits(&self) -> Option<u32> {
        self.timecode_user_bits.as_deref().and_then(parse_user_bits)
    }

    /// Whether this frame carries anything for the ancillary encoder
    pub fn has_ancillary(&self) -> bool {
        self.caption_len() > 0 || self.splice_command().is_some()
    }
}

/// A frame handed over by the upstream pipeline
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the frame on the upstream timeline
    pub position: u64,
    /// Playback speed the pipeline was running at (0 means paused)
    pub speed: f64,
    /// False when the pipeline skipped rendering this frame
    pub rendered: bool,
    /// Frame is a generated blank rather than real content
    pub test_image: bool,
    pub image: Option<FrameImage>,
    pub audio: Option<AudioPayload>,
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(position: u64, image: Option<FrameImage>, audio: Option<AudioPayload>) -> Self {
        Self {
            position,
            speed: 1.0,
            rendered: true,
            test_image: false,
            image,
            audio,
            metadata: FrameMetadata::default(),
        }
    }

    /// Picture to display, if the pipeline produced one
    pub fn renderable_image(&self) -> Option<&FrameImage> {
        if self.rendered {
            self.image.as_ref()
        } else {
            None
        }
    }
}

/// Source of frames for the scheduler
///
/// `pull_frame` is called from the serializer worker during preroll and from
/// the device completion thread afterwards, never concurrently.
pub trait FrameSource: Send {
    /// Next frame, or `None` when none is ready yet
    fn pull_frame(&mut self) -> Option<Frame>;

    /// True once the source will never produce another frame
    fn is_exhausted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_len_parsing() {
        let mut meta = FrameMetadata::default();
        assert_eq!(meta.caption_len(), 0);
        meta.caption_size = Some(String::new());
        assert_eq!(meta.caption_len(), 0);
        meta.caption_size = Some("9".to_string());
        assert_eq!(meta.caption_len(), 9);
        assert!(meta.has_ancillary());
    }

    #[test]
    fn test_blank_splice_ignored() {
        let meta = FrameMetadata {
            splice: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(meta.splice_command().is_none());
        assert!(!meta.has_ancillary());
    }

    #[test]
    fn test_unrendered_frame_has_no_image() {
        let image = FrameImage::new(2, 2, ImageFormat::Yuv422, vec![0; 8]);
        let mut frame = Frame::new(0, Some(image), None);
        assert!(frame.renderable_image().is_some());
        frame.rendered = false;
        assert!(frame.renderable_image().is_none());
    }

    #[test]
    fn test_vitc_metadata() {
        let meta = FrameMetadata {
            timecode: Some("10:00:00:12".to_string()),
            timecode_user_bits: Some("0x10".to_string()),
            ..Default::default()
        };
        assert_eq!(meta.vitc(), Some(Timecode::new(10, 0, 0, 12)));
        assert_eq!(meta.user_bits(), Some(16));
    }
}
