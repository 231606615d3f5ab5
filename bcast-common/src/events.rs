//! Events broadcast by the output scheduler

use serde::{Deserialize, Serialize};

/// Output scheduler events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    /// Scheduled playback started on the device
    PlaybackStarted {
        width: u32,
        height: u32,
        fps: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A frame was handed to the device (frame counter after the handoff)
    FrameShown {
        count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The device displayed a frame after its deadline
    FrameLate {
        count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The device dropped a frame; the counter was advanced to resync
    FrameDropped {
        count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Output stopped and all queues drained
    Stopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl OutputEvent {
    pub fn frame_shown(count: u64) -> Self {
        OutputEvent::FrameShown {
            count,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn frame_late(count: u64) -> Self {
        OutputEvent::FrameLate {
            count,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn frame_dropped(count: u64) -> Self {
        OutputEvent::FrameDropped {
            count,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn stopped() -> Self {
        OutputEvent::Stopped {
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event type name as serialized in the `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            OutputEvent::PlaybackStarted { .. } => "PlaybackStarted",
            OutputEvent::FrameShown { .. } => "FrameShown",
            OutputEvent::FrameLate { .. } => "FrameLate",
            OutputEvent::FrameDropped { .. } => "FrameDropped",
            OutputEvent::Stopped { .. } => "Stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = OutputEvent::frame_dropped(17);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FrameDropped");
        assert_eq!(json["count"], 17);
        assert_eq!(event.event_type(), "FrameDropped");
    }

    #[test]
    fn test_event_round_trip() {
        let json = serde_json::to_string(&OutputEvent::stopped()).unwrap();
        let back: OutputEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, OutputEvent::Stopped { .. }));
    }
}
