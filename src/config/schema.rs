use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::camera::{CaptureFormat, PixelFormat, Resolution, DEFAULT_JPEG_QUALITY};
use crate::session::SessionConfig;

pub use crate::gpio::IrCutConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Camera device settings
    pub camera: CameraConfig,
    /// IR-cut filter GPIO line
    pub ir_cut: IrCutConfig,
    /// Capture and streaming session settings
    pub session: SessionSettings,
    /// Host power commands
    pub power: PowerConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            http_port: 5000,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Camera device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 capture node
    pub device: String,
    /// Number of mmap buffers
    pub buffer_count: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            buffer_count: 4,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Capture and streaming session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Streaming session length in seconds
    pub stream_duration_secs: u64,
    /// Wait after moving the IR-cut filter, in milliseconds (minimum 100)
    pub settle_delay_ms: u64,
    /// Streaming resolution width
    pub video_width: u32,
    /// Streaming resolution height
    pub video_height: u32,
    /// Streaming pixel format
    pub video_format: PixelFormat,
    /// Streaming frame rate
    pub video_fps: u32,
    /// Auto white balance while streaming
    pub awb_enabled: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let video = CaptureFormat::canonical_video();
        Self {
            stream_duration_secs: 60,
            settle_delay_ms: 100,
            video_width: video.resolution.width,
            video_height: video.resolution.height,
            video_format: video.format,
            video_fps: video.fps,
            awb_enabled: video.awb_enabled,
        }
    }
}

impl SessionSettings {
    pub fn video_format(&self) -> CaptureFormat {
        CaptureFormat {
            resolution: Resolution::new(self.video_width, self.video_height),
            format: self.video_format,
            fps: self.video_fps,
            awb_enabled: self.awb_enabled,
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::new(
            self.video_format(),
            Duration::from_secs(self.stream_duration_secs),
            Duration::from_millis(self.settle_delay_ms),
        )
    }
}

/// Host power commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Command (program and arguments) that powers the host off
    pub power_off_command: Vec<String>,
    /// Command (program and arguments) that reboots the host
    pub reboot_command: Vec<String>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            power_off_command: vec!["sudo".to_string(), "poweroff".to_string()],
            reboot_command: vec!["sudo".to_string(), "reboot".to_string()],
        }
    }
}
