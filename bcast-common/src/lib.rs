//! # Broadcast Output Common Library
//!
//! Shared code for the broadcast output scheduler:
//! - Error type used by configuration loading
//! - TOML bootstrap configuration (`OutputConfig`, `VideoProfile`, `ThreadPriority`)
//! - Event types broadcast by the scheduler
//! - Frame/sample timing arithmetic
//! - VITC timecode parsing

pub mod config;
pub mod error;
pub mod events;
pub mod timecode;
pub mod timing;

pub use config::{KeyerMode, OutputConfig, ThreadPriority, VideoProfile};
pub use error::{Error, Result};
pub use events::OutputEvent;
pub use timecode::Timecode;
