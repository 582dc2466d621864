use std::sync::Arc;

use crate::power::PowerControl;
use crate::session::CameraSessionManager;

/// Application-wide state shared across handlers
///
/// All camera access goes through `manager`, which owns the camera, the
/// encoder, the IR-cut line and the control store.
pub struct AppState {
    /// Camera session manager
    pub manager: Arc<CameraSessionManager>,
    /// Host power control
    pub power: Arc<dyn PowerControl>,
}

impl AppState {
    pub fn new(manager: Arc<CameraSessionManager>, power: Arc<dyn PowerControl>) -> Arc<Self> {
        Arc::new(Self { manager, power })
    }
}
