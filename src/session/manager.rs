//! Camera session manager
//!
//! Arbitrates the single camera, its encoder and the IR-cut line between
//! still captures and streaming sessions. The device lock is a fair async
//! mutex, so waiting requests are served in arrival order.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::lease::{CameraRig, DeviceLease};
use super::stream::StreamSession;
use super::types::{SessionConfig, SessionState, SessionStatus, Snapshot, SNAPSHOT_FILENAME};
use crate::camera::{CameraDevice, CaptureFormat, FrameEncoder};
use crate::controls::{ControlSet, ControlStore};
use crate::error::Result;
use crate::gpio::{IrCutFilter, IrFilterObserver, IrFilterState};

pub struct CameraSessionManager {
    rig: Arc<Mutex<CameraRig>>,
    state: Arc<watch::Sender<SessionState>>,
    ir_observer: IrFilterObserver,
    controls: Arc<ControlStore>,
    config: SessionConfig,
}

impl CameraSessionManager {
    pub fn new(
        camera: Box<dyn CameraDevice>,
        encoder: Box<dyn FrameEncoder>,
        ir_filter: IrCutFilter,
        controls: Arc<ControlStore>,
        config: SessionConfig,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(SessionState::Idle);
        let ir_observer = ir_filter.observer();

        Self {
            rig: Arc::new(Mutex::new(CameraRig {
                camera,
                encoder,
                ir_filter,
            })),
            state: Arc::new(state_tx),
            ir_observer,
            controls,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Last state written to the IR-cut filter
    pub fn ir_filter(&self) -> Option<IrFilterState> {
        *self.ir_observer.read()
    }

    pub fn controls(&self) -> Arc<ControlSet> {
        self.controls.current()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            ir_filter: self.ir_filter(),
            controls: (*self.controls()).clone(),
        }
    }

    /// Wait for the device lock and enter `entering`
    async fn acquire(&self, entering: SessionState) -> DeviceLease {
        if self.rig.try_lock().is_err() {
            debug!("Device busy ({}), waiting for lock", self.state());
        }
        let guard = self.rig.clone().lock_owned().await;
        DeviceLease::new(guard, self.state.clone(), entering)
    }

    /// Bring the camera up in the video format with the filter engaged
    pub async fn prepare(&self) -> Result<CaptureFormat> {
        let lease = self.acquire(SessionState::Idle).await;
        let format = self.config.video_format.clone();

        let (_lease, result) = lease
            .run(move |rig| bring_up_video(rig, &format))
            .await?;

        let actual = result?;
        info!("Camera ready: {}", actual);
        Ok(actual)
    }

    /// Capture one still image.
    ///
    /// Stored controls are applied first, then the IR-cut filter is moved
    /// (`infrared` disengages it) and given the settle delay. The camera is
    /// left running afterwards.
    pub async fn snapshot(&self, infrared: bool) -> Result<Snapshot> {
        let lease = self.acquire(SessionState::Capturing).await;
        let controls = self.controls.current();
        let filter_state = IrFilterState::for_capture(infrared);

        let (lease, result) = lease
            .run(move |rig| -> Result<()> {
                if !controls.is_empty() {
                    rig.camera.apply_controls(&controls)?;
                }
                if infrared && !rig.ir_filter.is_connected() {
                    warn!("Infrared capture requested but no IR-cut line is configured");
                }
                rig.ir_filter.apply(filter_state)
            })
            .await?;
        result?;

        tokio::time::sleep(self.config.settle_delay).await;

        let (lease, result) = lease
            .run(|rig| -> Result<_> {
                if rig.camera.is_started() {
                    // Frames queued while idle predate the filter move
                    let dropped = rig.camera.discard_queued()?;
                    debug!("Dropped {} buffered frames before capture", dropped);
                } else {
                    rig.camera.start()?;
                }
                let frame = rig.camera.capture_frame()?;
                let jpeg = rig.encoder.encode(&frame)?;
                Ok((frame.sequence, jpeg))
            })
            .await?;
        drop(lease);

        let (sequence, data) = result?;
        info!(
            "Snapshot #{} captured (IR filter {}): {} bytes",
            sequence,
            filter_state,
            data.len()
        );

        Ok(Snapshot {
            data,
            filename: SNAPSHOT_FILENAME,
        })
    }

    /// Start a streaming session.
    ///
    /// Waits for the device, reconfigures it to the video format (always,
    /// even if already in it), engages the IR-cut filter and starts the
    /// camera. The returned session owns the device until it ends or is
    /// dropped.
    pub async fn start_stream(&self) -> Result<StreamSession> {
        let mut lease = self.acquire(SessionState::Streaming).await;
        lease.set_stop_on_release(true);
        let format = self.config.video_format.clone();

        let (mut lease, result) = lease
            .run(move |rig| -> Result<CaptureFormat> {
                let result = bring_up_video(rig, &format);
                if result.is_err() {
                    if let Err(e) = rig.camera.stop() {
                        warn!("Failed to stop {} after failed start: {}", rig.camera.name(), e);
                    }
                }
                result
            })
            .await?;
        let format = match result {
            Ok(format) => format,
            Err(e) => {
                // Already stopped on the blocking pool
                lease.set_stop_on_release(false);
                return Err(e);
            }
        };

        Ok(StreamSession::new(
            lease,
            format,
            self.config.stream_duration,
            self.config.capture_retry_delay,
        ))
    }

    /// Merge `partial` into the stored controls.
    ///
    /// Does not touch the device; the merged map is applied by the next
    /// snapshot.
    pub async fn update_controls(&self, partial: ControlSet) -> Result<Arc<ControlSet>> {
        self.controls.merge(partial).await
    }

    /// Stop the camera and release the IR-cut line
    pub async fn shutdown(&self) -> Result<()> {
        let lease = self.acquire(SessionState::Idle).await;

        let (_lease, result) = lease
            .run(|rig| {
                let result = rig.camera.stop();
                rig.ir_filter.release();
                result
            })
            .await?;
        result?;

        info!("Camera session manager shut down");
        Ok(())
    }
}

/// Restart the camera in the video format with the filter engaged
fn bring_up_video(rig: &mut CameraRig, format: &CaptureFormat) -> Result<CaptureFormat> {
    rig.camera.stop()?;
    let actual = rig.camera.configure(format)?;
    rig.ir_filter.apply(IrFilterState::Engaged)?;
    rig.camera.start()?;
    Ok(actual)
}
