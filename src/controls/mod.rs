//! Capture control persistence
//!
//! Holds the camera control map applied before every still capture and
//! keeps it in sync with `default.json` in the data directory.

mod store;
mod types;

pub use store::ControlStore;
pub use types::{parse_control_set, ControlSet, ControlValue};

/// File name of the persisted control document
pub const CONTROLS_FILE: &str = "default.json";
