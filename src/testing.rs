//! In-memory camera, encoder, GPIO line and power mocks for tests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;
use tempfile::TempDir;

use crate::camera::{CameraDevice, CaptureFormat, Frame, FrameEncoder, PixelFormat};
use crate::controls::{ControlSet, ControlStore, CONTROLS_FILE};
use crate::error::{AppError, Result};
use crate::gpio::{ActiveLevel, IrCutFilter, IrCutLine, LineLevel};
use crate::power::PowerControl;
use crate::session::{CameraSessionManager, SessionConfig};

/// Shared event log that also counts concurrent device users
#[derive(Clone, Default)]
pub struct BenchLog {
    events: Arc<Mutex<Vec<String>>>,
    in_use: Arc<AtomicUsize>,
    max_in_use: Arc<AtomicUsize>,
}

/// Marks a device call in progress until dropped
pub struct BusyGuard {
    in_use: Arc<AtomicUsize>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BenchLog {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn enter(&self) -> BusyGuard {
        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_use.fetch_max(now, Ordering::SeqCst);
        BusyGuard {
            in_use: self.in_use.clone(),
        }
    }

    /// Highest number of simultaneous device calls seen
    pub fn max_in_use(&self) -> usize {
        self.max_in_use.load(Ordering::SeqCst)
    }
}

/// Frames a running mock camera holds for the reader
const MOCK_BUFFERS: usize = 2;

#[derive(Default)]
struct MockCameraState {
    started: AtomicBool,
    /// Sequences of frames exposed but not yet read
    queued: Mutex<VecDeque<u64>>,
    stop_threads: Mutex<Vec<ThreadId>>,
    fail_configure: AtomicBool,
    reject_controls: AtomicBool,
    capture_failures: AtomicUsize,
    sequence: AtomicU64,
    applied: Mutex<Vec<ControlSet>>,
    configured: Mutex<Vec<CaptureFormat>>,
}

/// Camera that hands out tiny fake frames after a fixed delay.
///
/// While running it keeps [`MOCK_BUFFERS`] frames queued like a V4L2 driver:
/// `fill:N` marks a frame exposed into the queue, `expose:N` one exposed on
/// demand because the queue was empty, `capture:N` the frame handed out.
#[derive(Clone)]
pub struct MockCamera {
    log: BenchLog,
    capture_delay: Duration,
    state: Arc<MockCameraState>,
}

impl MockCamera {
    pub fn new(log: BenchLog, capture_delay: Duration) -> Self {
        Self {
            log,
            capture_delay,
            state: Arc::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    pub fn fail_configure(&self, fail: bool) {
        self.state.fail_configure.store(fail, Ordering::SeqCst);
    }

    pub fn reject_controls(&self, reject: bool) {
        self.state.reject_controls.store(reject, Ordering::SeqCst);
    }

    pub fn fail_next_captures(&self, count: usize) {
        self.state.capture_failures.store(count, Ordering::SeqCst);
    }

    pub fn applied_controls(&self) -> Vec<ControlSet> {
        self.state.applied.lock().clone()
    }

    pub fn configured_formats(&self) -> Vec<CaptureFormat> {
        self.state.configured.lock().clone()
    }

    /// Threads that called `stop`, in order
    pub fn stop_threads(&self) -> Vec<ThreadId> {
        self.state.stop_threads.lock().clone()
    }

    fn next_sequence(&self) -> u64 {
        self.state.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fill_buffers(&self) {
        let mut queued = self.state.queued.lock();
        while queued.len() < MOCK_BUFFERS {
            let sequence = self.next_sequence();
            self.log.record(format!("fill:{}", sequence));
            queued.push_back(sequence);
        }
    }
}

/// Index of the event where frame `sequence` was exposed
pub fn exposure_index(events: &[String], sequence: u64) -> Option<usize> {
    let filled = format!("fill:{}", sequence);
    let exposed = format!("expose:{}", sequence);
    events.iter().position(|e| *e == filled || *e == exposed)
}

/// Frame sequence carried by a [`MockEncoder`] JPEG
pub fn mock_jpeg_sequence(jpeg: &[u8]) -> u64 {
    let body = std::str::from_utf8(&jpeg[2..jpeg.len() - 2]).unwrap();
    body.trim_start_matches("frame-").parse().unwrap()
}

impl CameraDevice for MockCamera {
    fn name(&self) -> &str {
        "mock camera"
    }

    fn configure(&mut self, format: &CaptureFormat) -> Result<CaptureFormat> {
        let _busy = self.log.enter();
        self.log.record("configure");
        if self.state.fail_configure.load(Ordering::SeqCst) {
            return Err(AppError::Hardware("mock configure failure".to_string()));
        }
        self.state.configured.lock().push(format.clone());
        Ok(format.clone())
    }

    fn start(&mut self) -> Result<()> {
        let _busy = self.log.enter();
        self.log.record("start");
        if !self.state.started.swap(true, Ordering::SeqCst) {
            self.fill_buffers();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let _busy = self.log.enter();
        self.log.record("stop");
        self.state
            .stop_threads
            .lock()
            .push(std::thread::current().id());
        self.state.started.store(false, Ordering::SeqCst);
        self.state.queued.lock().clear();
        Ok(())
    }

    fn discard_queued(&mut self) -> Result<usize> {
        let _busy = self.log.enter();
        self.log.record("discard");
        let dropped = self.state.queued.lock().drain(..).count();
        Ok(dropped)
    }

    fn is_started(&self) -> bool {
        self.is_running()
    }

    fn capture_frame(&mut self) -> Result<Frame> {
        let _busy = self.log.enter();
        std::thread::sleep(self.capture_delay);

        if !self.is_running() {
            return Err(AppError::Hardware("camera is not started".to_string()));
        }

        let failures = self.state.capture_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.state
                .capture_failures
                .store(failures - 1, Ordering::SeqCst);
            self.log.record("capture:failed");
            return Err(AppError::Hardware("mock capture failure".to_string()));
        }

        let queued = self.state.queued.lock().pop_front();
        let sequence = match queued {
            Some(sequence) => sequence,
            None => {
                let sequence = self.next_sequence();
                self.log.record(format!("expose:{}", sequence));
                sequence
            }
        };
        self.log.record(format!("capture:{}", sequence));
        // Driver keeps filling while the camera runs
        self.fill_buffers();
        let format = CaptureFormat::canonical_video();
        Ok(Frame::new(
            Bytes::from(vec![sequence as u8; 16]),
            format.resolution,
            PixelFormat::Rgb24,
            0,
            sequence,
        ))
    }

    fn apply_controls(&mut self, controls: &ControlSet) -> Result<()> {
        let _busy = self.log.enter();
        self.log.record("apply_controls");
        if self.state.reject_controls.load(Ordering::SeqCst) {
            return Err(AppError::ControlApplication(
                "mock camera rejected controls".to_string(),
            ));
        }
        self.state.applied.lock().push(controls.clone());
        Ok(())
    }
}

/// Encoder that wraps the frame sequence in fake JPEG markers
pub struct MockEncoder {
    /// Every n-th frame fails to encode; 0 never fails
    fail_every: u64,
    count: u64,
}

impl MockEncoder {
    pub fn new(fail_every: u64) -> Self {
        Self {
            fail_every,
            count: 0,
        }
    }
}

impl FrameEncoder for MockEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<Bytes> {
        self.count += 1;
        if self.fail_every > 0 && self.count % self.fail_every == 0 {
            return Err(AppError::Encode(format!(
                "mock encode failure on frame {}",
                frame.sequence
            )));
        }
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(format!("frame-{}", frame.sequence).as_bytes());
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        Ok(Bytes::from(jpeg))
    }
}

/// GPIO line that remembers the last level written
#[derive(Clone, Default)]
pub struct MockLine {
    log: BenchLog,
    level: Arc<Mutex<Option<LineLevel>>>,
    fail: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl MockLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: BenchLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn level(&self) -> Option<LineLevel> {
        *self.level.lock()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl IrCutLine for MockLine {
    fn set(&mut self, level: LineLevel) -> Result<()> {
        let _busy = self.log.enter();
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Hardware("mock GPIO failure".to_string()));
        }
        self.log.record(format!("ir:{}", level));
        *self.level.lock() = Some(level);
        Ok(())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Power control that only records calls
#[derive(Clone, Default)]
pub struct MockPower {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl MockPower {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PowerControl for MockPower {
    async fn power_off(&self) -> Result<()> {
        self.calls.lock().push("power_off");
        Ok(())
    }

    async fn reboot(&self) -> Result<()> {
        self.calls.lock().push("reboot");
        Ok(())
    }
}

/// A manager wired to mocks, plus handles to inspect them
pub struct Bench {
    pub manager: Arc<CameraSessionManager>,
    pub camera: MockCamera,
    pub line: MockLine,
    pub log: BenchLog,
    pub dir: TempDir,
}

impl Bench {
    pub async fn new(stream_duration: Duration) -> Self {
        Self::with_encoder_failures(stream_duration, 0).await
    }

    pub async fn with_encoder_failures(stream_duration: Duration, fail_every: u64) -> Self {
        Self::build(stream_duration, fail_every, None).await
    }

    /// Bench whose filter drives `line` instead of the mock line
    pub async fn with_ir_line(stream_duration: Duration, line: Box<dyn IrCutLine>) -> Self {
        Self::build(stream_duration, 0, Some(line)).await
    }

    async fn build(
        stream_duration: Duration,
        fail_every: u64,
        ir_line: Option<Box<dyn IrCutLine>>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = BenchLog::default();
        let camera = MockCamera::new(log.clone(), Duration::from_millis(10));
        let line = MockLine::with_log(log.clone());
        let ir_line = ir_line.unwrap_or_else(|| Box::new(line.clone()));

        let store = ControlStore::load(dir.path().join(CONTROLS_FILE))
            .await
            .unwrap();
        let config = SessionConfig::new(
            CaptureFormat::canonical_video(),
            stream_duration,
            Duration::from_millis(100),
        );

        let manager = CameraSessionManager::new(
            Box::new(camera.clone()),
            Box::new(MockEncoder::new(fail_every)),
            IrCutFilter::new(ir_line, ActiveLevel::High),
            Arc::new(store),
            config,
        );

        Self {
            manager: Arc::new(manager),
            camera,
            line,
            log,
            dir,
        }
    }
}
