//! ircam - HTTP front end for a camera with a switchable IR-cut filter
//!
//! One camera is shared between still captures and timed MJPEG streams.
//! Access is serialized through [`session::CameraSessionManager`]; capture
//! controls persist in `default.json` via [`controls::ControlStore`].

pub mod camera;
pub mod config;
pub mod controls;
pub mod error;
pub mod gpio;
pub mod power;
pub mod session;
pub mod state;
pub mod utils;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AppError, Result};
