//! Webcam capture devices using nokhwa
//!
//! Opens cameras through the configured platform backend and exposes them as
//! [`CaptureDevice`]s. Grabs hand back the camera's native buffer (MJPEG,
//! YUYV, ...) so that pixel conversion stays off the per-device grab path.

use super::traits::{CameraInfo, CaptureDevice, DeviceOpener};
use super::types::{CameraId, CaptureBackend, CaptureConfig, RawFormat, RawFrame};
use crate::utils::error::CaptureError;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

impl From<CaptureBackend> for ApiBackend {
    fn from(backend: CaptureBackend) -> Self {
        match backend {
            CaptureBackend::Auto => ApiBackend::Auto,
            CaptureBackend::Video4Linux => ApiBackend::Video4Linux,
            CaptureBackend::MediaFoundation => ApiBackend::MediaFoundation,
            CaptureBackend::AvFoundation => ApiBackend::AVFoundation,
        }
    }
}

/// Get list of available cameras
pub fn list_cameras(backend: CaptureBackend) -> Vec<CameraInfo> {
    match nokhwa::query(backend.resolve().into()) {
        Ok(cameras) => cameras
            .into_iter()
            .filter_map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => *i,
                    CameraIndex::String(s) => s.parse::<u32>().ok()?,
                };
                Some(CameraInfo {
                    id: CameraId(id),
                    name: info.human_name(),
                    description: info.description().to_string(),
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// A camera opened through nokhwa with its stream running
pub struct NokhwaDevice {
    camera_id: CameraId,
    camera: Camera,
    released: bool,
}

impl NokhwaDevice {
    pub fn open(camera_id: CameraId, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let open_err = |e: nokhwa::NokhwaError| CaptureError::DeviceOpen {
            camera: camera_id,
            reason: e.to_string(),
        };

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.width, config.height),
                FrameFormat::MJPEG,
                config.fps,
            ),
        ));
        let backend = config.backend.resolve();
        let mut camera = Camera::with_backend(CameraIndex::Index(camera_id.0), requested, backend.into())
            .map_err(open_err)?;
        camera.open_stream().map_err(open_err)?;

        let format = camera.camera_format();
        tracing::info!(
            "Camera {} opened via {:?}: {}x{} @ {}fps, format={:?} (requested {}x{} @ {}fps)",
            camera_id,
            backend,
            format.resolution().width(),
            format.resolution().height(),
            format.frame_rate(),
            format.format(),
            config.width,
            config.height,
            config.fps
        );

        Ok(Self {
            camera_id,
            camera,
            released: false,
        })
    }
}

impl CaptureDevice for NokhwaDevice {
    fn grab(&mut self) -> Option<RawFrame> {
        // Blocks until the camera delivers its next buffer.
        let buffer = match self.camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::debug!("Camera {} grab failed: {:?}", self.camera_id, e);
                return None;
            }
        };
        let Some(format) = RawFormat::from_frame_format(buffer.source_frame_format()) else {
            tracing::debug!(
                "Camera {} delivered unsupported format {:?}",
                self.camera_id,
                buffer.source_frame_format()
            );
            return None;
        };
        let resolution = buffer.resolution();
        Some(RawFrame {
            data: buffer.buffer().to_vec(),
            width: resolution.width(),
            height: resolution.height(),
            format,
        })
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Error stopping camera {} stream: {:?}", self.camera_id, e);
        }
        tracing::info!("Camera {} released", self.camera_id);
    }
}

/// Opens [`NokhwaDevice`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaOpener;

impl DeviceOpener for NokhwaOpener {
    fn open(
        &self,
        camera: CameraId,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        Ok(Box::new(NokhwaDevice::open(camera, config)?))
    }
}
