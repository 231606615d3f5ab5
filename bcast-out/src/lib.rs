//! # Broadcast Output Scheduler (bcast-out)
//!
//! Real-time playout of upstream frames to a scheduled-playback video output
//! device with embedded audio, VITC timecode and vertical ancillary data.
//!
//! **Architecture:** Open/Start/Stop run on a single serializer thread. Once
//! prerolled, the device's completion and audio callbacks drive the schedule:
//! every completed frame pulls, renders and schedules the next one from a
//! fixed pool of device buffers.
//!
//! **Ancillary data:** closed captions (CEA-708 CDP, SMPTE 334) and SCTE-104
//! splice cues are packed as SMPTE 291 packets into 10-bit v210 VANC lines.

pub mod audio;
pub mod device;
pub mod error;
pub mod frame;
pub mod pattern;
pub mod playout;
pub mod vanc;
pub mod video;

pub use error::{Error, Result};
pub use frame::{Frame, FrameImage, FrameMetadata, FrameSource, ImageFormat};
pub use playout::{Output, OutputScheduler};
