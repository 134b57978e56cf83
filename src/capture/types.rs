//! Capture data model
//!
//! Camera identifiers, decoded frames, per-cycle batches and the raw buffers
//! latched by a grab.

use crate::utils::error::CaptureError;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{FrameFormat, Resolution};
use nokhwa::Buffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// Stable identifier of one camera for the lifetime of a session.
///
/// Doubles as the device index handed to the capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}

/// Platform capture backend, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureBackend {
    /// Pick the native backend for the build target.
    #[default]
    Auto,
    Video4Linux,
    MediaFoundation,
    AvFoundation,
}

impl CaptureBackend {
    /// Replace `Auto` with the native backend of the build target.
    pub fn resolve(self) -> Self {
        match self {
            CaptureBackend::Auto => {
                if cfg!(target_os = "windows") {
                    CaptureBackend::MediaFoundation
                } else if cfg!(target_os = "macos") {
                    CaptureBackend::AvFoundation
                } else {
                    CaptureBackend::Video4Linux
                }
            }
            other => other,
        }
    }
}

/// Per-camera capture settings. Immutable once a worker is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub backend: CaptureBackend,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            backend: CaptureBackend::Auto,
        }
    }
}

/// A decoded, addressable frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Interleaved pixel data, row-major, `channels` bytes per pixel.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Nanoseconds since the pipeline's monotonic origin.
    pub timestamp_ns: u64,
}

impl Frame {
    /// Zero-filled RGB frame, the fail-soft stand-in for an unreadable grab.
    pub fn blank(width: u32, height: u32, timestamp_ns: u64) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * 3],
            width,
            height,
            channels: 3,
            timestamp_ns,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One frame per configured camera, produced once per capture cycle.
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    /// Zero-based index of the capture cycle that produced this batch.
    pub cycle: u64,
    pub frames: BTreeMap<CameraId, Frame>,
}

impl FrameBatch {
    pub fn get(&self, camera: CameraId) -> Option<&Frame> {
        self.frames.get(&camera)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Pixel layout of a latched hardware buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    Mjpeg,
    Yuyv,
    Nv12,
    Gray,
    /// Already decoded, 3 bytes per pixel.
    Rgb24,
}

impl RawFormat {
    /// Map a backend frame format, `None` for layouts we cannot decode.
    #[allow(unreachable_patterns)]
    pub fn from_frame_format(format: FrameFormat) -> Option<Self> {
        match format {
            FrameFormat::MJPEG => Some(RawFormat::Mjpeg),
            FrameFormat::YUYV => Some(RawFormat::Yuyv),
            FrameFormat::NV12 => Some(RawFormat::Nv12),
            FrameFormat::GRAY => Some(RawFormat::Gray),
            FrameFormat::RAWRGB => Some(RawFormat::Rgb24),
            _ => None,
        }
    }
}

impl From<RawFormat> for FrameFormat {
    fn from(format: RawFormat) -> Self {
        match format {
            RawFormat::Mjpeg => FrameFormat::MJPEG,
            RawFormat::Yuyv => FrameFormat::YUYV,
            RawFormat::Nv12 => FrameFormat::NV12,
            RawFormat::Gray => FrameFormat::GRAY,
            RawFormat::Rgb24 => FrameFormat::RAWRGB,
        }
    }
}

/// Sensor buffer latched by a grab, not yet converted to pixels
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: RawFormat,
}

impl RawFrame {
    /// Decode into interleaved RGB.
    pub fn decode(&self, camera: CameraId) -> Result<Vec<u8>, CaptureError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.format == RawFormat::Rgb24 {
            if self.data.len() != expected {
                return Err(CaptureError::DeviceRead {
                    camera,
                    reason: format!(
                        "rgb24 buffer is {} bytes, expected {}",
                        self.data.len(),
                        expected
                    ),
                });
            }
            return Ok(self.data.clone());
        }

        let buffer = Buffer::new(
            Resolution::new(self.width, self.height),
            &self.data,
            self.format.into(),
        );
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::DeviceRead {
                camera,
                reason: e.to_string(),
            })?;
        Ok(image.into_raw())
    }
}

/// Monotonic clock shared by every component of one pipeline.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the clock was created.
    pub fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
