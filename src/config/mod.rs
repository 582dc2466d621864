//! Application configuration
//!
//! Read once at start from `config.json` in the data directory. Every
//! section is optional and falls back to its defaults.

mod schema;

pub use schema::*;

use std::path::Path;
use tracing::info;

use crate::error::{AppError, Result};

/// File name of the configuration document
pub const CONFIG_FILE: &str = "config.json";

impl AppConfig {
    /// Load configuration from `path`; a missing file yields the defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{} not found, using default configuration", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let config: AppConfig = serde_json::from_slice(&raw)
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", path.display(), e)))?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject values the rest of the program cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.web.http_port == 0 {
            return Err(AppError::Config("web.http_port must not be 0".to_string()));
        }
        if self.camera.device.is_empty() {
            return Err(AppError::Config("camera.device must be set".to_string()));
        }
        if self.session.stream_duration_secs == 0 {
            return Err(AppError::Config(
                "session.stream_duration_secs must be positive".to_string(),
            ));
        }
        if self.session.video_width == 0
            || self.session.video_height == 0
            || self.session.video_fps == 0
        {
            return Err(AppError::Config(
                "session video width, height and fps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
