//! Pixel format and capture format definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use v4l::format::fourcc;

/// Pixel layouts the camera pipeline knows how to turn into JPEG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// MJPEG compressed format (passed through untouched)
    Mjpeg,
    /// YUYV 4:2:2 packed format
    Yuyv,
    /// RGB24 format (3 bytes per pixel)
    Rgb24,
    /// BGR24 format (3 bytes per pixel)
    Bgr24,
}

impl PixelFormat {
    /// Convert to V4L2 FourCC
    pub fn to_fourcc(&self) -> fourcc::FourCC {
        match self {
            PixelFormat::Mjpeg => fourcc::FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => fourcc::FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => fourcc::FourCC::new(b"RGB3"),
            PixelFormat::Bgr24 => fourcc::FourCC::new(b"BGR3"),
        }
    }

    /// Try to convert from V4L2 FourCC
    pub fn from_fourcc(fourcc: fourcc::FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"BGR3" => Some(PixelFormat::Bgr24),
            _ => None,
        }
    }

    /// Bytes per pixel for packed formats, `None` for compressed ones
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Mjpeg => None,
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
        }
    }

    /// Minimum row length in bytes for a given width
    pub fn min_stride(&self, width: u32) -> Option<usize> {
        self.bytes_per_pixel().map(|bpp| bpp * width as usize)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Mjpeg => "MJPEG",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MJPEG" | "MJPG" | "JPEG" => Ok(PixelFormat::Mjpeg),
            "YUYV" => Ok(PixelFormat::Yuyv),
            "RGB24" | "RGB888" | "RGB3" => Ok(PixelFormat::Rgb24),
            "BGR24" | "BGR888" | "BGR3" => Ok(PixelFormat::Bgr24),
            _ => Err(format!("Unknown pixel format: {}", s)),
        }
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Get total pixels
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub const VGA: Resolution = Resolution::new(640, 480);
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Full description of how the sensor should deliver frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub resolution: Resolution,
    pub format: PixelFormat,
    /// Frames per second requested from the driver
    pub fps: u32,
    /// Automatic white balance
    pub awb_enabled: bool,
}

impl CaptureFormat {
    /// The baseline every streaming session starts from:
    /// 640x480 RGB24 at 15 fps with auto white balance off.
    pub fn canonical_video() -> Self {
        Self {
            resolution: Resolution::VGA,
            format: PixelFormat::Rgb24,
            fps: 15,
            awb_enabled: false,
        }
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::canonical_video()
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}fps (awb {})",
            self.resolution,
            self.format,
            self.fps,
            if self.awb_enabled { "on" } else { "off" }
        )
    }
}
