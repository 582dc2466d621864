//! V4L2 camera backend

use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use v4l::buffer::Type as BufferType;
use v4l::control::{self, Control, Description, Value};
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::*;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Format;

use super::device::CameraDevice;
use super::format::{CaptureFormat, PixelFormat, Resolution};
use super::frame::Frame;
use crate::controls::{ControlSet, ControlValue};
use crate::error::{AppError, Result};

/// Control names that never reach the driver control table
const FRAME_RATE_CONTROL: &str = "framerate";

/// Driver control names tried for automatic white balance
const AWB_CONTROL_NAMES: &[&str] = &["whitebalanceautomatic", "whitebalancetemperatureauto"];

/// Well-known control names mapped to their V4L2 spellings (normalized)
const CONTROL_ALIASES: &[(&str, &[&str])] = &[
    ("awbenable", AWB_CONTROL_NAMES),
    ("exposuretime", &["exposuretimeabsolute", "exposure"]),
    ("analoguegain", &["analoguegain", "gain"]),
    ("aeenable", &["autoexposure", "exposureauto"]),
    ("brightness", &["brightness"]),
    ("contrast", &["contrast"]),
    ("saturation", &["saturation"]),
    ("sharpness", &["sharpness"]),
];

/// Lowercase alphanumerics only, so `White Balance, Automatic` and
/// `WhiteBalanceAutomatic` compare equal
fn normalize_control_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// How a stored frame rate reaches the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameRateChange {
    /// Already running at the requested rate
    Unchanged,
    /// Device idle, S_PARM can go straight through
    Apply,
    /// Drivers refuse S_PARM while streaming; stop first, the next start
    /// picks the new interval up
    StopAndApply,
}

fn plan_frame_rate(current: u32, requested: u32, streaming: bool) -> FrameRateChange {
    if current == requested {
        FrameRateChange::Unchanged
    } else if streaming {
        FrameRateChange::StopAndApply
    } else {
        FrameRateChange::Apply
    }
}

/// Driver value that turns auto white balance on or off
fn awb_value(typ: control::Type, enabled: bool) -> Value {
    match typ {
        control::Type::Boolean => Value::Boolean(enabled),
        _ => Value::Integer(enabled as i64),
    }
}

/// A validated write, resolved before anything touches the driver
enum PendingWrite {
    FrameRate(u32),
    Driver(Control),
}

/// Camera backed by a V4L2 capture node using mmap buffers
pub struct V4l2Camera {
    path: PathBuf,
    name: String,
    device: Device,
    stream: Option<MmapStream<'static>>,
    buffer_count: u32,
    format: CaptureFormat,
    stride: u32,
    sequence: u64,
    /// Driver controls keyed by normalized name
    controls: HashMap<String, Description>,
}

impl V4l2Camera {
    /// Open a capture device by path
    pub fn open(path: impl AsRef<Path>, buffer_count: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening video device: {:?}", path);

        let device = Device::with_path(&path).map_err(|e| {
            AppError::Hardware(format!("Failed to open device {:?}: {}", path, e))
        })?;

        let caps = device.query_caps().map_err(|e| {
            AppError::Hardware(format!("Failed to query capabilities: {}", e))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(AppError::Hardware(format!(
                "{:?} ({}) is not a video capture device",
                path, caps.card
            )));
        }

        let controls = match device.query_controls() {
            Ok(descs) => descs
                .into_iter()
                .filter(|d| !matches!(d.typ, control::Type::CtrlClass))
                .map(|d| (normalize_control_name(&d.name), d))
                .collect(),
            Err(e) => {
                warn!("Failed to enumerate controls on {:?}: {}", path, e);
                HashMap::new()
            }
        };

        info!(
            "Opened camera {:?}: {} ({}), {} controls",
            path,
            caps.card,
            caps.driver,
            controls.len()
        );

        Ok(Self {
            path,
            name: caps.card,
            device,
            stream: None,
            buffer_count: buffer_count.max(1),
            format: CaptureFormat::canonical_video(),
            stride: 0,
            sequence: 0,
            controls,
        })
    }

    /// Device path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find_control(&self, name: &str) -> Option<&Description> {
        let normalized = normalize_control_name(name);
        if let Some(desc) = self.controls.get(&normalized) {
            return Some(desc);
        }

        CONTROL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .and_then(|(_, candidates)| {
                candidates
                    .iter()
                    .find_map(|candidate| self.controls.get(*candidate))
            })
    }

    fn set_frame_rate(&self, fps: u32) -> Result<()> {
        self.device
            .set_params(&Parameters::with_fps(fps))
            .map_err(|e| AppError::Hardware(format!("Failed to set frame rate {}: {}", fps, e)))?;
        Ok(())
    }

    /// Resolve a control to a driver write, checking type and range
    fn resolve_write(&self, name: &str, value: &ControlValue) -> Result<PendingWrite> {
        if normalize_control_name(name) == FRAME_RATE_CONTROL {
            let fps = value
                .as_i64()
                .filter(|fps| (1..=240).contains(fps))
                .ok_or_else(|| {
                    AppError::ControlApplication(format!("invalid FrameRate {}", value))
                })?;
            return Ok(PendingWrite::FrameRate(fps as u32));
        }

        let desc = self.find_control(name).ok_or_else(|| {
            AppError::ControlApplication(format!("unknown control '{}'", name))
        })?;

        if desc
            .flags
            .intersects(control::Flags::READ_ONLY | control::Flags::DISABLED)
        {
            return Err(AppError::ControlApplication(format!(
                "control '{}' is not writable",
                name
            )));
        }

        let invalid = || {
            AppError::ControlApplication(format!(
                "invalid value {} for control '{}' ({})",
                value, name, desc.name
            ))
        };

        let driver_value = match desc.typ {
            control::Type::Boolean => Value::Boolean(value.as_bool().ok_or_else(invalid)?),
            control::Type::Integer
            | control::Type::Integer64
            | control::Type::Menu
            | control::Type::IntegerMenu
            | control::Type::Bitmask => {
                let v = value.as_i64().ok_or_else(invalid)?;
                if v < desc.minimum || v > desc.maximum {
                    return Err(AppError::ControlApplication(format!(
                        "control '{}' value {} outside [{}, {}]",
                        name, v, desc.minimum, desc.maximum
                    )));
                }
                Value::Integer(v)
            }
            control::Type::String => match value {
                ControlValue::Text(s) => Value::String(s.clone()),
                _ => return Err(invalid()),
            },
            _ => {
                return Err(AppError::ControlApplication(format!(
                    "control '{}' has unsupported type {:?}",
                    name, desc.typ
                )))
            }
        };

        Ok(PendingWrite::Driver(Control {
            id: desc.id,
            value: driver_value,
        }))
    }

    fn apply_frame_rate(&mut self, fps: u32) -> Result<()> {
        match plan_frame_rate(self.format.fps, fps, self.stream.is_some()) {
            FrameRateChange::Unchanged => return Ok(()),
            FrameRateChange::StopAndApply => {
                debug!("Stopping {} to change frame rate to {}", self.name, fps);
                self.stop()?;
            }
            FrameRateChange::Apply => {}
        }
        self.set_frame_rate(fps)?;
        self.format.fps = fps;
        Ok(())
    }

    /// A camera without an AWB control is left alone; one that refuses the
    /// write fails the configure
    fn apply_awb(&self, enabled: bool) -> Result<()> {
        let desc = AWB_CONTROL_NAMES
            .iter()
            .find_map(|name| self.controls.get(*name));
        match desc {
            Some(desc) => self
                .device
                .set_control(Control {
                    id: desc.id,
                    value: awb_value(desc.typ, enabled),
                })
                .map_err(|e| {
                    AppError::Hardware(format!(
                        "Failed to set auto white balance to {}: {}",
                        enabled, e
                    ))
                }),
            None => {
                debug!("{} has no auto white balance control", self.name);
                Ok(())
            }
        }
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, format: &CaptureFormat) -> Result<CaptureFormat> {
        if self.stream.is_some() {
            return Err(AppError::Hardware(
                "cannot reconfigure a running camera".to_string(),
            ));
        }

        let requested = Format::new(
            format.resolution.width,
            format.resolution.height,
            format.format.to_fourcc(),
        );
        let actual = self
            .device
            .set_format(&requested)
            .map_err(|e| AppError::Hardware(format!("Failed to set format: {}", e)))?;

        let pixel_format = PixelFormat::from_fourcc(actual.fourcc).ok_or_else(|| {
            AppError::Hardware(format!(
                "Driver switched to unsupported pixel format {}",
                actual.fourcc
            ))
        })?;

        if actual.width != format.resolution.width || actual.height != format.resolution.height
        {
            warn!(
                "Requested {}, got {}x{}",
                format.resolution, actual.width, actual.height
            );
        }

        let fps = match self.set_frame_rate(format.fps) {
            Ok(()) => format.fps,
            Err(e) => {
                warn!("{}", e);
                self.device
                    .params()
                    .ok()
                    .map(|p| {
                        let interval = p.interval;
                        if interval.numerator == 0 {
                            format.fps
                        } else {
                            interval.denominator / interval.numerator
                        }
                    })
                    .unwrap_or(format.fps)
            }
        };

        self.apply_awb(format.awb_enabled)?;

        self.format = CaptureFormat {
            resolution: Resolution::new(actual.width, actual.height),
            format: pixel_format,
            fps,
            awb_enabled: format.awb_enabled,
        };
        self.stride = actual.stride;

        info!("Configured {}: {}", self.name, self.format);
        Ok(self.format.clone())
    }

    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut stream =
            MmapStream::with_buffers(&self.device, BufferType::VideoCapture, self.buffer_count)
                .map_err(|e| {
                    AppError::Hardware(format!("Failed to create buffer stream: {}", e))
                })?;
        // The first dequeue queues every buffer and turns streaming on
        stream
            .next()
            .map_err(|e| AppError::Hardware(format!("Failed to start streaming: {}", e)))?;

        self.stream = Some(stream);
        debug!("{} started", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                warn!("Failed to stop streaming on {}: {}", self.name, e);
            }
            debug!("{} stopped", self.name);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.stream.is_some()
    }

    fn discard_queued(&mut self) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };

        // Every buffer may hold a frame from before the call; cycling through
        // all of them requeues each one empty
        for _ in 0..self.buffer_count {
            stream
                .next()
                .map_err(|e| AppError::Hardware(format!("Failed to drain buffers: {}", e)))?;
        }
        Ok(self.buffer_count as usize)
    }

    fn capture_frame(&mut self) -> Result<Frame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AppError::Hardware("camera is not started".to_string()))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| AppError::Hardware(format!("Capture failed: {}", e)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };
        if used == 0 {
            return Err(AppError::Hardware("driver returned an empty buffer".to_string()));
        }

        self.sequence = self.sequence.wrapping_add(1);
        Ok(Frame::new(
            Bytes::copy_from_slice(&buf[..used]),
            self.format.resolution,
            self.format.format,
            self.stride,
            self.sequence,
        ))
    }

    fn apply_controls(&mut self, controls: &ControlSet) -> Result<()> {
        // Validate everything up front so a bad entry writes nothing
        let writes = controls
            .iter()
            .map(|(name, value)| self.resolve_write(name, value))
            .collect::<Result<Vec<_>>>()?;

        for write in writes {
            match write {
                PendingWrite::FrameRate(fps) => self
                    .apply_frame_rate(fps)
                    .map_err(|e| AppError::ControlApplication(e.to_string()))?,
                PendingWrite::Driver(control) => {
                    let id = control.id;
                    self.device.set_control(control).map_err(|e| {
                        AppError::ControlApplication(format!(
                            "driver rejected control 0x{:08x}: {}",
                            id, e
                        ))
                    })?
                }
            }
        }

        debug!("Applied {} controls to {}", controls.len(), self.name);
        Ok(())
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
