//! Camera session management
//!
//! Still captures and streaming sessions share one camera. Both go through
//! [`CameraSessionManager`], which hands out an exclusive [`DeviceLease`] per
//! operation and tracks the current [`SessionState`].

mod lease;
mod manager;
mod stream;
mod types;

pub use lease::{CameraRig, DeviceLease};
pub use manager::CameraSessionManager;
pub use stream::{mjpeg_part, StreamSession, MJPEG_CONTENT_TYPE, SESSION_ENDED_PAGE};
pub use types::{
    SessionConfig, SessionState, SessionStatus, Snapshot, CAPTURE_RETRY_DELAY,
    DEFAULT_STREAM_DURATION, MIN_SETTLE_DELAY, SNAPSHOT_FILENAME,
};
