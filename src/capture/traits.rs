//! Capture trait definitions
//!
//! Backend-agnostic traits for capture devices, plus the descriptive types
//! returned when enumerating cameras.

use super::types::{CameraId, CaptureConfig, RawFrame};
use crate::utils::error::CaptureError;
use serde::{Deserialize, Serialize};

/// A hardware capture handle.
///
/// A device is opened on, and only ever touched from, its worker's thread.
/// `grab` is expected to be the cheap half of a capture: it latches the next
/// exposure and hands back the undecoded buffer. Decoding happens later in
/// the Dispatcher via [`RawFrame::decode`].
pub trait CaptureDevice {
    /// Latch the next exposure. `None` when the device delivered nothing.
    fn grab(&mut self) -> Option<RawFrame>;

    /// Release the hardware. Called exactly once, after the last grab.
    fn release(&mut self);
}

/// Opens capture devices for workers.
pub trait DeviceOpener: Send + Sync {
    fn open(
        &self,
        camera: CameraId,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Index used to open the camera
    pub id: CameraId,

    /// Device name
    pub name: String,

    /// Backend-specific description (driver, bus, path)
    pub description: String,
}
