//! Bootstrap configuration for the output scheduler
//!
//! Loaded once from a TOML file (optionally overridden from the command line) and
//! handed to the scheduler at construction. Values cannot change while a session
//! is running; a new Start picks up a new config only after a restart.
//!
//! ```toml
//! card = 0
//! preroll = 3
//! channels = 2
//! priority = "max"
//!
//! [profile]
//! width = 1920
//! height = 1080
//! frame_rate_num = 25
//! frame_rate_den = 1
//! progressive = true
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Requested output video profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    pub progressive: bool,
}

impl VideoProfile {
    /// Frame rate as a float (e.g. 29.97 for 30000/1001)
    pub fn fps(&self) -> f64 {
        if self.frame_rate_den == 0 {
            return 0.0;
        }
        self.frame_rate_num as f64 / self.frame_rate_den as f64
    }
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate_num: 25,
            frame_rate_den: 1,
            progressive: true,
        }
    }
}

/// Scheduling priority requested for the device callback threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadPriority {
    /// One below the maximum real-time priority
    Max,
    /// One above the minimum real-time priority
    Min,
    /// Explicit real-time priority value
    Explicit(i32),
}

impl FromStr for ThreadPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "max" => Ok(ThreadPriority::Max),
            "min" => Ok(ThreadPriority::Min),
            other => other
                .parse::<i32>()
                .map(ThreadPriority::Explicit)
                .map_err(|_| {
                    Error::InvalidInput(format!(
                        "priority must be \"max\", \"min\" or an integer, got {:?}",
                        other
                    ))
                }),
        }
    }
}

/// Keyer operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyerMode {
    Off,
    Internal,
    External,
}

impl KeyerMode {
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => KeyerMode::Off,
            2 => KeyerMode::External,
            _ => KeyerMode::Internal,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, KeyerMode::Off)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Output scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Index of the output card to open
    #[serde(default)]
    pub card: u32,

    /// Requested video profile
    #[serde(default)]
    pub profile: VideoProfile,

    /// Frames scheduled ahead of playback (raised to the minimum at start)
    #[serde(default = "default_preroll")]
    pub preroll: u32,

    /// Channel count delivered by the upstream pipeline
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Disable audio output entirely
    #[serde(default)]
    pub audio_off: bool,

    /// Stop the output when the upstream pipeline pauses (speed 0)
    #[serde(default)]
    pub terminate_on_pause: bool,

    /// Callback thread priority hint: "max", "min" or an integer
    #[serde(default)]
    pub priority: Option<String>,

    /// 0 = keyer off, 1 = internal, 2 = external
    #[serde(default)]
    pub keyer: u8,

    /// Keyer level in (0, 1]; anything else means full level
    #[serde(default)]
    pub keyer_level: f64,

    /// Split the 4:2:2 byte swap across worker threads
    #[serde(default)]
    pub sliced_swab: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_preroll() -> u32 {
    3
}

fn default_channels() -> u16 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            card: 0,
            profile: VideoProfile::default(),
            preroll: default_preroll(),
            channels: default_channels(),
            audio_off: false,
            terminate_on_pause: false,
            priority: None,
            keyer: 0,
            keyer_level: 0.0,
            sliced_swab: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl OutputConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded output configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: OutputConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.profile.width == 0 || self.profile.height == 0 {
            return Err(Error::Config(format!(
                "profile dimensions must be non-zero ({}x{})",
                self.profile.width, self.profile.height
            )));
        }
        if self.profile.frame_rate_num == 0 || self.profile.frame_rate_den == 0 {
            return Err(Error::Config(format!(
                "invalid profile frame rate {}/{}",
                self.profile.frame_rate_num, self.profile.frame_rate_den
            )));
        }
        if self.channels == 0 {
            return Err(Error::Config("channels must be at least 1".to_string()));
        }
        self.thread_priority()?;
        Ok(())
    }

    /// Parsed priority hint, `None` when no elevation was requested
    pub fn thread_priority(&self) -> Result<Option<ThreadPriority>> {
        self.priority
            .as_deref()
            .map(ThreadPriority::from_str)
            .transpose()
    }

    pub fn keyer_mode(&self) -> KeyerMode {
        KeyerMode::from_index(self.keyer)
    }

    /// Keyer level mapped onto the device's 0..=255 range
    pub fn keyer_level_u8(&self) -> u8 {
        if self.keyer_level > 0.0 && self.keyer_level <= 1.0 {
            (255.0 * self.keyer_level) as u8
        } else {
            255
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = OutputConfig::from_toml_str("").unwrap();
        assert_eq!(config.preroll, 3);
        assert_eq!(config.channels, 2);
        assert_eq!(config.profile, VideoProfile::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.thread_priority().unwrap().is_none());
    }

    #[test]
    fn test_profile_and_priority_parse() {
        let text = r#"
            channels = 6
            priority = "max"
            keyer = 2
            keyer_level = 0.5

            [profile]
            width = 720
            height = 480
            frame_rate_num = 30000
            frame_rate_den = 1001
            progressive = false
        "#;
        let config = OutputConfig::from_toml_str(text).unwrap();
        assert_eq!(config.profile.height, 480);
        assert!((config.profile.fps() - 29.97).abs() < 0.01);
        assert_eq!(config.thread_priority().unwrap(), Some(ThreadPriority::Max));
        assert_eq!(config.keyer_mode(), KeyerMode::External);
        assert_eq!(config.keyer_level_u8(), 127);
    }

    #[test]
    fn test_priority_values() {
        assert_eq!("min".parse::<ThreadPriority>().unwrap(), ThreadPriority::Min);
        assert_eq!("42".parse::<ThreadPriority>().unwrap(), ThreadPriority::Explicit(42));
        assert!("fastest".parse::<ThreadPriority>().is_err());
    }

    #[test]
    fn test_keyer_level_out_of_range_is_full() {
        let mut config = OutputConfig::default();
        config.keyer_level = 0.0;
        assert_eq!(config.keyer_level_u8(), 255);
        config.keyer_level = 3.0;
        assert_eq!(config.keyer_level_u8(), 255);
        config.keyer_level = 1.0;
        assert_eq!(config.keyer_level_u8(), 255);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(OutputConfig::from_toml_str("channels = 0").is_err());
        assert!(OutputConfig::from_toml_str("priority = \"urgent\"").is_err());
        assert!(OutputConfig::from_toml_str("[profile]\nwidth = 0\nheight = 10\nframe_rate_num = 25\nframe_rate_den = 1\nprogressive = true").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "card = 1\npreroll = 5").unwrap();
        let config = OutputConfig::load(file.path()).unwrap();
        assert_eq!(config.card, 1);
        assert_eq!(config.preroll, 5);
    }

    #[test]
    fn test_load_missing_file() {
        let result = OutputConfig::load(Path::new("/nonexistent/bcast-out.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
