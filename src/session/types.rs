//! Session types

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::camera::CaptureFormat;
use crate::controls::ControlSet;
use crate::gpio::IrFilterState;

/// Suggested file name for still captures
pub const SNAPSHOT_FILENAME: &str = "captured_image.jpg";

/// Minimum time the IR-cut filter gets to move before a capture
pub const MIN_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Pause before retrying a failed capture inside a stream
pub const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default streaming session length
pub const DEFAULT_STREAM_DURATION: Duration = Duration::from_secs(60);

/// What the device is currently used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nobody holds the device
    #[default]
    Idle,
    /// A still capture holds the device
    Capturing,
    /// A streaming session holds the device
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Capturing => write!(f, "capturing"),
            SessionState::Streaming => write!(f, "streaming"),
        }
    }
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// `None` until the filter has been driven once
    pub ir_filter: Option<IrFilterState>,
    pub controls: ControlSet,
}

/// An encoded still capture
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Bytes,
    pub filename: &'static str,
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Format every streaming session starts from
    pub video_format: CaptureFormat,
    /// Wall-clock length of a streaming session
    pub stream_duration: Duration,
    /// Wait between moving the IR-cut filter and capturing
    pub settle_delay: Duration,
    /// Pause after a failed capture inside a stream
    pub capture_retry_delay: Duration,
}

impl SessionConfig {
    pub fn new(video_format: CaptureFormat, stream_duration: Duration, settle_delay: Duration) -> Self {
        Self {
            video_format,
            stream_duration,
            settle_delay: settle_delay.max(MIN_SETTLE_DELAY),
            capture_retry_delay: CAPTURE_RETRY_DELAY,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(
            CaptureFormat::canonical_video(),
            DEFAULT_STREAM_DURATION,
            MIN_SETTLE_DELAY,
        )
    }
}
