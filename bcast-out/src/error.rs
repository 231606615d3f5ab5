//! Error types for bcast-out
//!
//! Typed errors inside the scheduler. The serialized operation boundary
//! (`Open`/`Start`/`Stop`) collapses these to a success flag after logging.

use thiserror::Error;

/// Main error type for the output scheduler
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] bcast_common::Error),

    /// No device display mode matches the requested profile
    #[error("No display mode matches {width}x{height} @ {fps:.2} fps ({scan})")]
    ModeMismatch {
        width: u32,
        height: u32,
        fps: f64,
        scan: &'static str,
    },

    /// Output device call failed
    #[error("Device error: {0}")]
    Device(String),

    /// No device is open
    #[error("No output device open")]
    NoDevice,

    /// Device buffer allocation failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Frame scheduling failed
    #[error("Schedule failed: {0}")]
    Schedule(String),

    /// Audio payload could not be converted for the device
    #[error("Audio conversion error: {0}")]
    AudioConversion(String),

    /// Ancillary data could not be built or written
    #[error("Ancillary data error: {0}")]
    Ancillary(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using bcast-out Error
pub type Result<T> = std::result::Result<T, Error>;
