//! Error types and handling
//!
//! Capture-side and recording-side error types, plus the aggregate used by
//! the command-line front-end and any control surface.

use crate::capture::types::CameraId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by capture devices and the capture pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The device could not be opened or configured. Fatal for that camera.
    #[error("cannot open camera {camera}: {reason}")]
    DeviceOpen { camera: CameraId, reason: String },

    /// A grabbed buffer could not be read or decoded. Absorbed fail-soft.
    #[error("cannot read frame from camera {camera}: {reason}")]
    DeviceRead { camera: CameraId, reason: String },

    /// No camera could be opened, so there is nothing to synchronize.
    #[error("no camera could be opened")]
    NoCameras,

    /// The sync gate was aborted while a party was waiting on it.
    #[error("sync gate broken")]
    GateBroken,

    /// A capture thread could not be started.
    #[error("cannot spawn {thread} thread: {reason}")]
    ThreadSpawn { thread: String, reason: String },
}

/// Errors raised by the recorder and its video sinks
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("invalid recording configuration: {0}")]
    InvalidConfig(String),

    /// The sink for one camera could not be created. Other cameras continue.
    #[error("cannot create video sink for camera {camera}: {reason}")]
    WriterCreate { camera: CameraId, reason: String },

    #[error("video sink for camera {camera} failed: {reason}")]
    WriterIo { camera: CameraId, reason: String },

    #[error("alignment thread panicked")]
    AlignmentPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error response for control surfaces
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(AppError::from(CaptureError::NoCameras));
        assert_eq!(response.code, "CAPTURE_ERROR");
        assert_eq!(response.message, "Capture error: no camera could be opened");

        let response = ErrorResponse::from(AppError::from(RecordingError::AlreadyRecording));
        assert_eq!(response.code, "RECORDING_ERROR");

        let response = ErrorResponse::from(AppError::Config("bad".to_string()));
        assert_eq!(response.code, "CONFIG_ERROR");
    }

    #[test]
    fn test_device_open_message_names_camera() {
        let err = CaptureError::DeviceOpen {
            camera: CameraId(2),
            reason: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "cannot open camera cam2: busy");
    }

    #[test]
    fn test_thread_spawn_keeps_cause() {
        let err = CaptureError::ThreadSpawn {
            thread: "capture-dispatch".to_string(),
            reason: "Resource temporarily unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot spawn capture-dispatch thread: Resource temporarily unavailable"
        );
    }
}
