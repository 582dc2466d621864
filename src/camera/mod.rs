//! Camera capture and JPEG encoding

pub mod device;
pub mod encoder;
pub mod format;
pub mod frame;
pub mod v4l2;

pub use device::CameraDevice;
pub use encoder::{FrameEncoder, JpegEncoder, DEFAULT_JPEG_QUALITY};
pub use format::{CaptureFormat, PixelFormat, Resolution};
pub use frame::{is_valid_jpeg, Frame};
pub use v4l2::V4l2Camera;
