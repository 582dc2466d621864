//! JPEG encoder for captured frames
//!
//! ```text
//! MJPEG ───────────────validate──────────────> JPEG
//! RGB24/BGR24 ─────────turbojpeg─────────────> JPEG
//! YUYV ──deinterleave to planar 4:2:2──turbojpeg──> JPEG
//! ```

use bytes::Bytes;
use tracing::debug;

use super::format::PixelFormat;
use super::frame::Frame;
use crate::error::{AppError, Result};

/// Default JPEG quality for stills and stream frames
pub const DEFAULT_JPEG_QUALITY: u32 = 95;

/// Turns raw frames into JPEG bytes
pub trait FrameEncoder: Send {
    fn encode(&mut self, frame: &Frame) -> Result<Bytes>;
}

/// turbojpeg backed encoder.
///
/// Not thread-safe; it lives inside the device rig and is only used while
/// the device lease is held.
pub struct JpegEncoder {
    compressor: turbojpeg::Compressor,
    quality: u32,
    /// Planar 4:2:2 scratch buffer for YUYV input
    planar: Vec<u8>,
}

impl JpegEncoder {
    pub fn new(quality: u32) -> Result<Self> {
        let quality = quality.clamp(1, 100);

        let mut compressor = turbojpeg::Compressor::new().map_err(|e| {
            AppError::Encode(format!("Failed to create turbojpeg compressor: {}", e))
        })?;
        compressor
            .set_quality(quality as i32)
            .map_err(|e| AppError::Encode(format!("Failed to set JPEG quality: {}", e)))?;

        debug!("JPEG encoder ready (quality {})", quality);
        Ok(Self {
            compressor,
            quality,
            planar: Vec::new(),
        })
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    fn check_size(frame: &Frame, stride: usize) -> Result<()> {
        let height = frame.resolution.height as usize;
        let row = frame
            .format
            .min_stride(frame.resolution.width)
            .unwrap_or(stride);
        // Last row does not need padding
        let expected = stride * height.saturating_sub(1) + row;
        if height == 0 || frame.len() < expected {
            return Err(AppError::Encode(format!(
                "{} frame too small: {} < {}",
                frame.format,
                frame.len(),
                expected
            )));
        }
        Ok(())
    }

    fn encode_packed_rgb(&mut self, frame: &Frame, format: turbojpeg::PixelFormat) -> Result<Bytes> {
        let stride = frame
            .effective_stride()
            .ok_or_else(|| AppError::Encode("missing stride".to_string()))?;
        Self::check_size(frame, stride)?;

        let image = turbojpeg::Image {
            pixels: frame.data(),
            width: frame.resolution.width as usize,
            pitch: stride,
            height: frame.resolution.height as usize,
            format,
        };

        let jpeg = self
            .compressor
            .compress_to_vec(image)
            .map_err(|e| AppError::Encode(format!("JPEG compression failed: {}", e)))?;
        Ok(Bytes::from(jpeg))
    }

    fn encode_yuyv(&mut self, frame: &Frame) -> Result<Bytes> {
        let width = frame.resolution.width as usize;
        let height = frame.resolution.height as usize;
        if width % 2 != 0 {
            return Err(AppError::Encode(format!(
                "YUYV width must be even, got {}",
                width
            )));
        }
        let stride = frame
            .effective_stride()
            .ok_or_else(|| AppError::Encode("missing stride".to_string()))?;
        Self::check_size(frame, stride)?;

        yuyv_to_planar_422(frame.data(), width, height, stride, &mut self.planar);

        let image = turbojpeg::YuvImage {
            pixels: self.planar.as_slice(),
            width,
            align: 1,
            height,
            subsamp: turbojpeg::Subsamp::Sub2x1,
        };

        let jpeg = self
            .compressor
            .compress_yuv_to_vec(image)
            .map_err(|e| AppError::Encode(format!("JPEG compression failed: {}", e)))?;
        Ok(Bytes::from(jpeg))
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Bytes> {
        if frame.is_empty() {
            return Err(AppError::Encode("empty frame".to_string()));
        }

        match frame.format {
            PixelFormat::Mjpeg => {
                if frame.is_valid_jpeg() {
                    Ok(frame.data_bytes())
                } else {
                    Err(AppError::Encode(format!(
                        "corrupt MJPEG frame #{} ({} bytes)",
                        frame.sequence,
                        frame.len()
                    )))
                }
            }
            PixelFormat::Rgb24 => self.encode_packed_rgb(frame, turbojpeg::PixelFormat::RGB),
            PixelFormat::Bgr24 => self.encode_packed_rgb(frame, turbojpeg::PixelFormat::BGR),
            PixelFormat::Yuyv => self.encode_yuyv(frame),
        }
    }
}

/// Split packed YUYV rows into consecutive Y, U and V planes
fn yuyv_to_planar_422(src: &[u8], width: usize, height: usize, stride: usize, dst: &mut Vec<u8>) {
    let chroma_width = width / 2;
    let y_size = width * height;
    let c_size = chroma_width * height;

    dst.clear();
    dst.resize(y_size + 2 * c_size, 0);
    let (y_plane, chroma) = dst.split_at_mut(y_size);
    let (u_plane, v_plane) = chroma.split_at_mut(c_size);

    for row in 0..height {
        let line = &src[row * stride..row * stride + width * 2];
        let y_row = &mut y_plane[row * width..(row + 1) * width];
        let u_row = &mut u_plane[row * chroma_width..(row + 1) * chroma_width];
        let v_row = &mut v_plane[row * chroma_width..(row + 1) * chroma_width];

        for (i, px) in line.chunks_exact(4).enumerate() {
            y_row[i * 2] = px[0];
            u_row[i] = px[1];
            y_row[i * 2 + 1] = px[2];
            v_row[i] = px[3];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::format::Resolution;
    use crate::camera::frame::is_valid_jpeg;

    fn frame(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Frame {
        Frame::new(
            Bytes::from(data),
            Resolution::new(width, height),
            format,
            0,
            1,
        )
    }

    #[test]
    fn test_yuyv_deinterleave() {
        // 4x1: Y0 U0 Y1 V0 Y2 U1 Y3 V1
        let src = [10, 100, 11, 200, 12, 101, 13, 201];
        let mut dst = Vec::new();
        yuyv_to_planar_422(&src, 4, 1, 8, &mut dst);
        assert_eq!(dst, vec![10, 11, 12, 13, 100, 101, 200, 201]);
    }

    #[test]
    fn test_encode_rgb24() {
        let mut encoder = JpegEncoder::new(DEFAULT_JPEG_QUALITY).unwrap();
        let data: Vec<u8> = (0..64 * 48 * 3).map(|i| (i % 251) as u8).collect();
        let jpeg = encoder
            .encode(&frame(PixelFormat::Rgb24, 64, 48, data))
            .unwrap();
        assert!(is_valid_jpeg(&jpeg));
    }

    #[test]
    fn test_encode_yuyv() {
        let mut encoder = JpegEncoder::new(80).unwrap();
        let data = vec![128u8; 64 * 48 * 2];
        let jpeg = encoder
            .encode(&frame(PixelFormat::Yuyv, 64, 48, data))
            .unwrap();
        assert!(is_valid_jpeg(&jpeg));
    }

    #[test]
    fn test_mjpeg_passthrough_and_corrupt_input() {
        let mut encoder = JpegEncoder::new(DEFAULT_JPEG_QUALITY).unwrap();

        let mut data = vec![0xFF, 0xD8];
        data.extend(vec![0x42u8; 32]);
        data.extend([0xFF, 0xD9]);
        let out = encoder
            .encode(&frame(PixelFormat::Mjpeg, 640, 480, data.clone()))
            .unwrap();
        assert_eq!(&out[..], &data[..]);

        let err = encoder
            .encode(&frame(PixelFormat::Mjpeg, 640, 480, vec![1, 2, 3, 4, 5]))
            .unwrap_err();
        assert!(matches!(err, AppError::Encode(_)));
    }

    #[test]
    fn test_short_buffer_is_encode_error() {
        let mut encoder = JpegEncoder::new(DEFAULT_JPEG_QUALITY).unwrap();
        let err = encoder
            .encode(&frame(PixelFormat::Rgb24, 640, 480, vec![0u8; 100]))
            .unwrap_err();
        assert!(matches!(err, AppError::Encode(_)));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegEncoder::new(0).unwrap().quality(), 1);
        assert_eq!(JpegEncoder::new(250).unwrap().quality(), 100);
    }
}
