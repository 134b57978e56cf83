//! In-memory sinks for recorder tests

use super::sink::{SinkFactory, SinkParams, VideoSink};
use crate::capture::types::{CameraId, Frame};
use crate::utils::error::RecordingError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Recorded {
    opened: BTreeMap<CameraId, SinkParams>,
    /// (width, height, timestamp) of every write, per camera
    writes: BTreeMap<CameraId, Vec<(u32, u32, u64)>>,
    releases: BTreeMap<CameraId, u32>,
}

/// Sink factory that remembers everything written to it
#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    recorded: Arc<Mutex<Recorded>>,
    failing_open: BTreeSet<CameraId>,
    failing_write: BTreeSet<CameraId>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open(mut self, camera: CameraId) -> Self {
        self.failing_open.insert(camera);
        self
    }

    pub fn failing_write(mut self, camera: CameraId) -> Self {
        self.failing_write.insert(camera);
        self
    }

    pub fn params(&self, camera: CameraId) -> Option<SinkParams> {
        self.recorded.lock().opened.get(&camera).cloned()
    }

    pub fn writes(&self, camera: CameraId) -> Vec<(u32, u32, u64)> {
        self.recorded
            .lock()
            .writes
            .get(&camera)
            .cloned()
            .unwrap_or_default()
    }

    pub fn releases(&self, camera: CameraId) -> u32 {
        self.recorded
            .lock()
            .releases
            .get(&camera)
            .copied()
            .unwrap_or(0)
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(
        &self,
        camera: CameraId,
        params: &SinkParams,
    ) -> Result<Box<dyn VideoSink>, RecordingError> {
        if self.failing_open.contains(&camera) {
            return Err(RecordingError::WriterCreate {
                camera,
                reason: "scripted failure".to_string(),
            });
        }
        self.recorded.lock().opened.insert(camera, params.clone());
        Ok(Box::new(MemorySink {
            camera,
            recorded: self.recorded.clone(),
            fail_writes: self.failing_write.contains(&camera),
            released: false,
        }))
    }
}

struct MemorySink {
    camera: CameraId,
    recorded: Arc<Mutex<Recorded>>,
    fail_writes: bool,
    released: bool,
}

impl VideoSink for MemorySink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        if self.fail_writes {
            return Err(RecordingError::WriterIo {
                camera: self.camera,
                reason: "scripted failure".to_string(),
            });
        }
        self.recorded
            .lock()
            .writes
            .entry(self.camera)
            .or_default()
            .push((frame.width, frame.height, frame.timestamp_ns));
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecordingError> {
        if !self.released {
            self.released = true;
            *self.recorded.lock().releases.entry(self.camera).or_default() += 1;
        }
        Ok(())
    }
}
