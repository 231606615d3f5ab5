//! Per-start output session parameters

use crate::device::{DisplayMode, OutputDevice, PixelFormat};
use crate::frame::ImageFormat;
use std::sync::Arc;

/// Settings fixed when output starts and dropped when it stops
pub struct Session {
    pub device: Arc<dyn OutputDevice>,
    pub mode: DisplayMode,
    pub preroll: u32,
    /// Output goes through the keyer (ARGB buffers)
    pub keyer: bool,
    pub audio: bool,
    pub in_channels: u16,
    pub out_channels: u16,
    pub vanc: bool,
    pub terminate_on_pause: bool,
    pub sliced_swab: bool,
}

impl Session {
    pub fn pixel_format(&self) -> PixelFormat {
        if self.keyer {
            PixelFormat::Argb8
        } else {
            PixelFormat::Yuv8
        }
    }

    /// Upstream image layout this session consumes
    pub fn image_format(&self) -> ImageFormat {
        if self.keyer {
            ImageFormat::Rgba
        } else {
            ImageFormat::Yuv422
        }
    }

    /// Bytes per row of a pool buffer
    pub fn stride(&self) -> usize {
        self.mode.width as usize * if self.keyer { 4 } else { 2 }
    }

    /// Frames kept by the pool: the preroll depth plus two spares
    pub fn pool_size(&self) -> usize {
        self.preroll as usize + 2
    }
}
