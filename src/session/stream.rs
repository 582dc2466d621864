//! Timed MJPEG streaming session

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::lease::{CameraRig, DeviceLease};
use crate::camera::CaptureFormat;
use crate::error::AppError;
use crate::utils::LogThrottler;

/// Content type of the streaming response
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Final payload once the session deadline passed
pub const SESSION_ENDED_PAGE: &str = "<html><body><h1>Times up!</h1>\
<button onclick=\"location.href='/video_feed'\">Return to Camera Feed</button>\
</body></html>";

/// One multipart part around a JPEG frame
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + jpeg.len());
    buf.put_slice(b"--frame\r\n");
    buf.put_slice(b"Content-Type: image/jpeg\r\n\r\n");
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n\r\n");
    buf.freeze()
}

/// Result of one capture + encode round
enum FrameOutcome {
    Encoded(Bytes),
    EncodeFailed(AppError),
    CaptureFailed(AppError),
}

fn capture_and_encode(rig: &mut CameraRig) -> FrameOutcome {
    let frame = match rig.camera.capture_frame() {
        Ok(frame) => frame,
        Err(e) => return FrameOutcome::CaptureFailed(e),
    };
    match rig.encoder.encode(&frame) {
        Ok(jpeg) => FrameOutcome::Encoded(jpeg),
        Err(e) => FrameOutcome::EncodeFailed(e),
    }
}

/// A running stream that owns the device until its deadline.
///
/// Created by [`CameraSessionManager::start_stream`](super::CameraSessionManager::start_stream)
/// with the camera already started in the video format.
pub struct StreamSession {
    id: Uuid,
    lease: DeviceLease,
    format: CaptureFormat,
    started_at: Instant,
    deadline: Instant,
    retry_delay: Duration,
}

impl StreamSession {
    pub(crate) fn new(
        lease: DeviceLease,
        format: CaptureFormat,
        duration: Duration,
        retry_delay: Duration,
    ) -> Self {
        let started_at = Instant::now();
        Self {
            id: Uuid::new_v4(),
            lease,
            format,
            started_at,
            deadline: started_at + duration,
            retry_delay,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Format the camera was configured with
    pub fn format(&self) -> &CaptureFormat {
        &self.format
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Turn the session into the response body.
    ///
    /// Yields one multipart part per encoded frame until the deadline, then
    /// stops the camera, releases the device and yields [`SESSION_ENDED_PAGE`].
    /// Dropping the stream early releases the device the same way.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let StreamSession {
            id,
            lease,
            format,
            started_at,
            deadline,
            retry_delay,
        } = self;

        async_stream::stream! {
            let throttler = LogThrottler::with_secs(5);
            let mut lease = Some(lease);
            let mut frames = 0u64;
            let mut skipped = 0u64;

            info!("Stream session {} started: {}", id, format);

            while Instant::now() < deadline {
                let Some(current) = lease.take() else {
                    break;
                };

                let outcome = match current.run(capture_and_encode).await {
                    Ok((returned, outcome)) => {
                        lease = Some(returned);
                        outcome
                    }
                    Err(e) => {
                        // Lease is gone with the failed task; device already released
                        error!("Stream session {} aborted: {}", id, e);
                        return;
                    }
                };

                match outcome {
                    FrameOutcome::Encoded(jpeg) => {
                        if Instant::now() >= deadline {
                            break;
                        }
                        frames += 1;
                        yield Ok(mjpeg_part(&jpeg));
                    }
                    FrameOutcome::EncodeFailed(e) => {
                        skipped += 1;
                        if let Some(suppressed) = throttler.check("encode") {
                            warn!(
                                "Stream session {}: dropping frame: {} ({} similar suppressed)",
                                id, e, suppressed
                            );
                        }
                    }
                    FrameOutcome::CaptureFailed(e) => {
                        if let Some(suppressed) = throttler.check("capture") {
                            warn!(
                                "Stream session {}: capture failed: {} ({} similar suppressed)",
                                id, e, suppressed
                            );
                        }
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }

            // Stop on the blocking pool and return to IDLE before the final page
            if let Some(current) = lease.take() {
                match current.run(|rig| rig.camera.stop()).await {
                    Ok((mut returned, result)) => {
                        if let Err(e) = result {
                            warn!("Stream session {}: failed to stop camera: {}", id, e);
                        }
                        returned.set_stop_on_release(false);
                    }
                    Err(e) => error!("Stream session {}: stop task failed: {}", id, e),
                }
            }
            info!(
                "Stream session {} ended after {:.1}s: {} frames sent, {} dropped",
                id,
                started_at.elapsed().as_secs_f64(),
                frames,
                skipped
            );

            yield Ok(Bytes::from_static(SESSION_ENDED_PAGE.as_bytes()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjpeg_part_layout() {
        let part = mjpeg_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n\r\n"
        );
    }

    #[test]
    fn test_session_ended_page_links_back() {
        assert!(SESSION_ENDED_PAGE.contains("<h1>Times up!</h1>"));
        assert!(SESSION_ENDED_PAGE.contains("location.href='/video_feed'"));
        assert!(SESSION_ENDED_PAGE.contains("Return to Camera Feed"));
    }
}
