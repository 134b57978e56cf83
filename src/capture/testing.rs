//! Scripted capture devices for tests

use super::traits::{CaptureDevice, DeviceOpener};
use super::types::{CameraId, CaptureConfig, RawFormat, RawFrame};
use crate::utils::error::CaptureError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    grabs: HashMap<CameraId, usize>,
    releases: HashMap<CameraId, usize>,
}

/// Opens in-memory devices that produce frames filled with the camera id.
#[derive(Debug, Default)]
pub struct ScriptedOpener {
    failing: HashSet<CameraId>,
    dropping: HashSet<CameraId>,
    grab_delay: Duration,
    counters: Arc<Mutex<Counters>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening this camera fails.
    pub fn failing(mut self, camera: CameraId) -> Self {
        self.failing.insert(camera);
        self
    }

    /// Every grab on this camera delivers nothing.
    pub fn dropping_grabs(mut self, camera: CameraId) -> Self {
        self.dropping.insert(camera);
        self
    }

    pub fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    pub fn grabs(&self, camera: CameraId) -> usize {
        self.counters.lock().grabs.get(&camera).copied().unwrap_or(0)
    }

    pub fn releases(&self, camera: CameraId) -> usize {
        self.counters.lock().releases.get(&camera).copied().unwrap_or(0)
    }
}

impl DeviceOpener for ScriptedOpener {
    fn open(
        &self,
        camera: CameraId,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if self.failing.contains(&camera) {
            return Err(CaptureError::DeviceOpen {
                camera,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(Box::new(ScriptedDevice {
            camera,
            width: config.width,
            height: config.height,
            drop_grabs: self.dropping.contains(&camera),
            grab_delay: self.grab_delay,
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedDevice {
    camera: CameraId,
    width: u32,
    height: u32,
    drop_grabs: bool,
    grab_delay: Duration,
    counters: Arc<Mutex<Counters>>,
}

impl CaptureDevice for ScriptedDevice {
    fn grab(&mut self) -> Option<RawFrame> {
        if !self.grab_delay.is_zero() {
            std::thread::sleep(self.grab_delay);
        }
        *self.counters.lock().grabs.entry(self.camera).or_default() += 1;
        if self.drop_grabs {
            return None;
        }
        Some(RawFrame {
            data: vec![self.camera.0 as u8; self.width as usize * self.height as usize * 3],
            width: self.width,
            height: self.height,
            format: RawFormat::Rgb24,
        })
    }

    fn release(&mut self) {
        *self.counters.lock().releases.entry(self.camera).or_default() += 1;
    }
}
