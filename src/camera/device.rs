//! Camera device abstraction
//!
//! Every call here may block on the driver, so callers run them on the
//! blocking pool while holding the device lease.

use super::format::CaptureFormat;
use super::frame::Frame;
use crate::controls::ControlSet;
use crate::error::Result;

/// A single camera sensor that can be reconfigured, started and sampled
pub trait CameraDevice: Send {
    /// Human readable device name for logs
    fn name(&self) -> &str;

    /// Apply a capture format. Returns the format the driver actually accepted.
    ///
    /// Only valid while the device is stopped.
    fn configure(&mut self, format: &CaptureFormat) -> Result<CaptureFormat>;

    /// Start delivering frames. Starting a running device is a no-op.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering frames. Stopping a stopped device is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Whether frames are currently being delivered
    fn is_started(&self) -> bool;

    /// Throw away frames the driver buffered before this call.
    ///
    /// A running camera keeps filling its queue while nobody reads it, so
    /// the next capture after a pause would otherwise return an old frame.
    /// Returns how many frames were dropped. No-op on a stopped device.
    fn discard_queued(&mut self) -> Result<usize>;

    /// Block until the next frame is available
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Write named controls to the driver.
    ///
    /// Fails with [`AppError::ControlApplication`](crate::error::AppError)
    /// when a name is unknown or a value is rejected; in that case no
    /// control from the set has been written.
    fn apply_controls(&mut self, controls: &ControlSet) -> Result<()>;
}
