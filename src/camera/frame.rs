//! Captured frame data structures

use bytes::Bytes;
use std::time::Instant;

use super::format::{PixelFormat, Resolution};

/// Smallest buffer a driver can hand us that still holds a JPEG
const MIN_JPEG_SIZE: usize = 4;

/// A single frame as delivered by the camera driver
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Stride (bytes per line), 0 for compressed formats
    pub stride: u32,
    /// Driver sequence number
    pub sequence: u64,
    /// Timestamp when frame was dequeued
    pub capture_ts: Instant,
}

impl Frame {
    pub fn new(
        data: Bytes,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            resolution,
            format,
            stride,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row length to use when walking the buffer.
    ///
    /// Falls back to the tightly packed length when the driver reports 0.
    pub fn effective_stride(&self) -> Option<usize> {
        let min = self.format.min_stride(self.resolution.width)?;
        Some((self.stride as usize).max(min))
    }

    /// Validate JPEG frame data (SOI at the start, EOI at the end)
    pub fn is_valid_jpeg(&self) -> bool {
        is_valid_jpeg(&self.data)
    }
}

/// Check JPEG start and end markers.
///
/// Some UVC devices pad the buffer after EOI, so trailing zeros are accepted.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    if data.len() < MIN_JPEG_SIZE || data[0] != 0xFF || data[1] != 0xD8 {
        return false;
    }

    let trimmed = match data.iter().rposition(|&b| b != 0) {
        Some(pos) => &data[..=pos],
        None => return false,
    };
    trimmed.len() >= MIN_JPEG_SIZE && trimmed.ends_with(&[0xFF, 0xD9])
}
