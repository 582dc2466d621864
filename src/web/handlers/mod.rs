use axum::{
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::controls::parse_control_set;
use crate::error::{AppError, Result};
use crate::session::{SessionStatus, MJPEG_CONTENT_TYPE};
use crate::state::AppState;

/// `/` sends browsers straight to the live feed
pub async fn index() -> Redirect {
    Redirect::to("/video_feed")
}

#[derive(Deserialize, Default)]
pub struct RawCaptureQuery {
    /// `true` moves the IR-cut filter away before capturing
    pub infrared: Option<String>,
}

/// Parse the `infrared` flag; absent or empty means visible light
fn parse_infrared(value: Option<&str>) -> Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if v.is_empty() || v == "false" || v == "0" => Ok(false),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) => Err(AppError::Validation(format!(
            "infrared must be true or false, got '{}'",
            v
        ))),
    }
}

/// Single still capture, returned as a JPEG attachment
pub async fn raw_capture(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<RawCaptureQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) =
        query.map_err(|e| AppError::Validation(format!("Invalid query: {}", e)))?;
    let infrared = parse_infrared(query.infrared.as_deref())?;

    let snapshot = state.manager.snapshot(infrared).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", snapshot.filename),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        snapshot.data,
    )
        .into_response())
}

/// Timed MJPEG stream
///
/// Waits for the camera, then streams frames until the session deadline and
/// finishes with a "Times up!" page.
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Result<Response> {
    let session = state.manager.start_stream().await?;
    info!(
        "Streaming session {} for {:?}",
        session.id(),
        state.manager.config().stream_duration
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Body::from_stream(session.into_stream()),
    )
        .into_response())
}

pub async fn shutdown(State(state): State<Arc<AppState>>) -> Result<&'static str> {
    state.power.power_off().await?;
    Ok("Powering Off")
}

pub async fn reboot(State(state): State<Arc<AppState>>) -> Result<&'static str> {
    state.power.reboot().await?;
    Ok("Rebooting")
}

pub async fn test_connection() -> &'static str {
    "Connected"
}

/// Merge a JSON object of controls into the stored set
pub async fn update_data(State(state): State<Arc<AppState>>, body: Bytes) -> Result<&'static str> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::Validation("Invalid JSON data".to_string()));
    }

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON data: {}", e)))?;
    let partial = parse_control_set(value)?;
    if partial.is_empty() {
        return Err(AppError::Validation("Invalid JSON data".to_string()));
    }

    state.manager.update_controls(partial).await?;
    Ok("Data updated successfully")
}

/// Session state, IR-cut filter position and stored controls
pub async fn status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.manager.status())
}
