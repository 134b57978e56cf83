//! Rig configuration file
//!
//! A JSON document describing the cameras of the rig, the capture backend
//! and the recording defaults. Every field has a default, so an empty
//! object `{}` is a valid configuration for a three-camera rig.

use crate::capture::types::{CameraId, CaptureBackend, CaptureConfig};
use crate::recorder::sink::VideoCodec;
use crate::recorder::state::SessionConfig;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One camera of the rig
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfigEntry {
    pub id: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps() -> u32 {
    30
}

impl CameraConfigEntry {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

/// Recording settings used when the command line does not override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingDefaults {
    pub output_dir: PathBuf,
    pub base_name: String,
    pub fps: u32,
    pub sync_window_ms: u64,
    pub queue_capacity: usize,
    pub codec: VideoCodec,
    pub poll_interval_us: u64,
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./videos"),
            base_name: "session".to_string(),
            fps: 30,
            sync_window_ms: 25,
            queue_capacity: 64,
            codec: VideoCodec::Mpeg4,
            poll_interval_us: 500,
        }
    }
}

/// Whole-rig configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RigConfig {
    pub cameras: Vec<CameraConfigEntry>,
    pub backend: CaptureBackend,
    pub recording: RecordingDefaults,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            cameras: (0..3).map(CameraConfigEntry::new).collect(),
            backend: CaptureBackend::Auto,
            recording: RecordingDefaults::default(),
        }
    }
}

impl RigConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: RigConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(
            "Loaded rig config with {} camera(s) from {:?}",
            config.cameras.len(),
            path
        );
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.cameras.is_empty() {
            return Err(AppError::Config("no cameras configured".to_string()));
        }
        let mut seen = BTreeSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id) {
                return Err(AppError::Config(format!(
                    "camera {} is listed twice",
                    camera.id
                )));
            }
            if camera.width == 0 || camera.height == 0 || camera.fps == 0 {
                return Err(AppError::Config(format!(
                    "camera {} needs non-zero width, height and fps",
                    camera.id
                )));
            }
        }
        if self.recording.fps == 0 {
            return Err(AppError::Config("recording fps must be positive".to_string()));
        }
        if self.recording.queue_capacity == 0 {
            return Err(AppError::Config(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.recording.poll_interval_us == 0 {
            return Err(AppError::Config(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Capture settings per camera with the backend resolved
    pub fn capture_specs(&self) -> Vec<(CameraId, CaptureConfig)> {
        let backend = self.backend.resolve();
        self.cameras
            .iter()
            .map(|camera| {
                (
                    CameraId(camera.id),
                    CaptureConfig {
                        width: camera.width,
                        height: camera.height,
                        fps: camera.fps,
                        backend,
                    },
                )
            })
            .collect()
    }

    /// Session settings for `cameras` from the recording defaults
    pub fn session_config(&self, cameras: Vec<CameraId>) -> SessionConfig {
        let recording = &self.recording;
        SessionConfig {
            cameras,
            output_dir: recording.output_dir.clone(),
            base_name: recording.base_name.clone(),
            fps: recording.fps,
            sync_window: Duration::from_millis(recording.sync_window_ms),
            queue_capacity: recording.queue_capacity,
            codec: recording.codec,
            poll_interval: Duration::from_micros(recording.poll_interval_us),
        }
    }
}
