//! Exclusive device lease
//!
//! The lease wraps the owned guard of the device lock. Dropping it (normal
//! return, error, cancelled request, panic on the blocking pool) puts the
//! manager back into IDLE and unlocks the device.

use std::sync::Arc;
use tokio::sync::{watch, OwnedMutexGuard};
use tracing::{debug, warn};

use super::types::SessionState;
use crate::camera::{CameraDevice, FrameEncoder};
use crate::error::{AppError, Result};
use crate::gpio::IrCutFilter;

/// Everything that must only be touched by the lock holder
pub struct CameraRig {
    pub camera: Box<dyn CameraDevice>,
    pub encoder: Box<dyn FrameEncoder>,
    pub ir_filter: IrCutFilter,
}

/// RAII handle on the device lock
pub struct DeviceLease {
    rig: OwnedMutexGuard<CameraRig>,
    state: Arc<watch::Sender<SessionState>>,
    stop_on_release: bool,
}

impl DeviceLease {
    pub(crate) fn new(
        rig: OwnedMutexGuard<CameraRig>,
        state: Arc<watch::Sender<SessionState>>,
        entering: SessionState,
    ) -> Self {
        state.send_replace(entering);
        Self {
            rig,
            state,
            stop_on_release: false,
        }
    }

    /// Stop the camera when the lease is dropped.
    ///
    /// The stop then runs on whatever thread drops the lease, so paths that
    /// end normally stop the camera through [`run`](Self::run) and clear
    /// this first; it is left set only to cover cancellation.
    pub fn set_stop_on_release(&mut self, stop: bool) {
        self.stop_on_release = stop;
    }

    /// Run a blocking device call on the blocking pool.
    ///
    /// The lease travels with the call and comes back with its result. If the
    /// awaiting task goes away, the lease is dropped when the call finishes.
    pub async fn run<F, R>(self, f: F) -> Result<(Self, R)>
    where
        F: FnOnce(&mut CameraRig) -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut lease = self;
            let result = f(&mut *lease.rig);
            (lease, result)
        })
        .await
        .map_err(|e| AppError::Internal(format!("device task failed: {}", e)))
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        if self.stop_on_release {
            if let Err(e) = self.rig.camera.stop() {
                warn!("Failed to stop {} on release: {}", self.rig.camera.name(), e);
            }
        }
        self.state.send_replace(SessionState::Idle);
        debug!("Device lease released");
    }
}
