//! Display mode negotiation

use crate::device::DisplayMode;
use crate::error::{Error, Result};
use bcast_common::VideoProfile;
use tracing::{debug, info};

/// Whether `mode` can carry the profile
///
/// Width and scan type must match exactly and frame rates must agree in their
/// integer part. A 480-line profile is carried in a 486-line NTSC mode.
pub fn mode_matches(mode: &DisplayMode, profile: &VideoProfile) -> bool {
    mode.width == profile.width
        && mode.is_progressive() == profile.progressive
        && mode.fps() as i64 == profile.fps() as i64
        && (mode.height == profile.height || (mode.height == 486 && profile.height == 480))
}

/// First device mode compatible with the profile
pub fn select_display_mode(modes: &[DisplayMode], profile: &VideoProfile) -> Result<DisplayMode> {
    for mode in modes {
        debug!(
            "Device mode {} {}x{} {:.3} fps progressive={}",
            mode.name,
            mode.width,
            mode.height,
            mode.fps(),
            mode.is_progressive()
        );
        if mode_matches(mode, profile) {
            info!("Selected display mode {}", mode.name);
            return Ok(mode.clone());
        }
    }
    Err(Error::ModeMismatch {
        width: profile.width,
        height: profile.height,
        fps: profile.fps(),
        scan: if profile.progressive { "progressive" } else { "interlaced" },
    })
}
