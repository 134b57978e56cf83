//! Recording state management
//!
//! Defines the recorder state machine, the immutable per-session settings
//! and the summary handed back when a session stops.

use super::sink::VideoCodec;
use crate::capture::types::CameraId;
use crate::utils::error::RecordingError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session
    #[default]
    Idle,
    /// Aligning and writing frames
    Recording,
    /// Draining the alignment thread and releasing sinks
    Stopping,
}

/// Opaque token returned by `start()` and required by `stop()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings for starting a recording session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cameras: Vec<CameraId>,
    pub output_dir: PathBuf,
    pub base_name: String,
    pub fps: u32,
    /// Maximum timestamp spread for frames to be written together
    pub sync_window: Duration,
    pub queue_capacity: usize,
    pub codec: VideoCodec,
    /// Alignment thread sleep while some camera has nothing pending
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn new(cameras: Vec<CameraId>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            cameras,
            output_dir: output_dir.into(),
            base_name: "session".to_string(),
            fps: 30,
            sync_window: Duration::from_millis(25),
            queue_capacity: 64,
            codec: VideoCodec::default(),
            poll_interval: Duration::from_micros(500),
        }
    }

    pub fn validate(&self) -> Result<(), RecordingError> {
        if self.cameras.is_empty() {
            return Err(RecordingError::InvalidConfig(
                "at least one camera is required".to_string(),
            ));
        }
        let unique: BTreeSet<_> = self.cameras.iter().collect();
        if unique.len() != self.cameras.len() {
            return Err(RecordingError::InvalidConfig(
                "camera ids must be unique".to_string(),
            ));
        }
        if self.base_name.trim().is_empty() {
            return Err(RecordingError::InvalidConfig(
                "base name must not be empty".to_string(),
            ));
        }
        if self.fps == 0 {
            return Err(RecordingError::InvalidConfig("fps must be positive".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(RecordingError::InvalidConfig(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(RecordingError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// An active session. Created on `start()`, never modified afterwards.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub handle: SessionHandle,
    pub config: SessionConfig,
    pub started_at: DateTime<Local>,
    /// `YYYYMMDD_HHMMSS` of `started_at`, shared by every file of the session
    pub stamp: String,
}

impl RecordingSession {
    pub fn new(config: SessionConfig) -> Self {
        let started_at = Local::now();
        Self {
            handle: SessionHandle::new(),
            stamp: started_at.format("%Y%m%d_%H%M%S").to_string(),
            config,
            started_at,
        }
    }

    /// `<outputDir>/<baseName>_<stamp>_cam<id>.<ext>`
    pub fn output_path(&self, camera: CameraId) -> PathBuf {
        self.config.output_dir.join(format!(
            "{}_{}_{}.{}",
            self.config.base_name,
            self.stamp,
            camera,
            self.config.codec.extension()
        ))
    }
}

/// Result of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub handle: SessionHandle,
    /// Files actually opened, one per camera that received a frame
    pub files: Vec<PathBuf>,
    pub frames_written: BTreeMap<CameraId, u64>,
    /// Batches that fell within the sync window
    pub committed: u64,
    /// Pending entries discarded for being too early
    pub dropped: u64,
    /// Entries evicted by full queues
    pub evictions: BTreeMap<CameraId, u64>,
    pub duration: Duration,
}

impl RecordingSummary {
    /// Wall-clock duration as `HH:MM:SS`
    pub fn duration_hms(&self) -> String {
        let secs = self.duration.as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_format() {
        let mut config = SessionConfig::new(vec![CameraId(0), CameraId(2)], "/data/videos");
        config.base_name = "rig".to_string();
        let session = RecordingSession::new(config);

        assert_eq!(session.stamp.len(), 15);
        assert_eq!(&session.stamp[8..9], "_");
        let expected = format!("/data/videos/rig_{}_cam2.mp4", session.stamp);
        assert_eq!(session.output_path(CameraId(2)), PathBuf::from(expected));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let good = SessionConfig::new(vec![CameraId(0), CameraId(1)], "out");
        assert!(good.validate().is_ok());

        let mut empty = good.clone();
        empty.cameras.clear();
        assert!(matches!(empty.validate(), Err(RecordingError::InvalidConfig(_))));

        let mut duplicate = good.clone();
        duplicate.cameras.push(CameraId(0));
        assert!(duplicate.validate().is_err());

        let mut no_capacity = good;
        no_capacity.queue_capacity = 0;
        assert!(no_capacity.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = SessionConfig::new(vec![CameraId(0)], "out");
        config.poll_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(RecordingError::InvalidConfig(_))));

        config.poll_interval = Duration::from_micros(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_hms() {
        let summary = RecordingSummary {
            handle: SessionHandle::new(),
            files: Vec::new(),
            frames_written: BTreeMap::new(),
            committed: 0,
            dropped: 0,
            evictions: BTreeMap::new(),
            duration: Duration::from_secs(3 * 3600 + 7 * 60 + 9),
        };
        assert_eq!(summary.duration_hms(), "03:07:09");
    }

    #[test]
    fn test_handles_are_distinct() {
        assert_ne!(SessionHandle::new(), SessionHandle::new());
    }
}
