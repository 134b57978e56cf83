//! Per-camera video sinks
//!
//! A sink is created lazily from the first committed frame of its camera and
//! keeps that frame's dimensions for the rest of the session. The FFmpeg sink
//! pipes raw frames to an `ffmpeg` child process over stdin.

use crate::capture::types::{CameraId, Frame};
use crate::utils::error::RecordingError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Output codec and container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoCodec {
    /// MPEG-4 Part 2 (fourcc `mp4v`) in MP4
    #[default]
    Mpeg4,
    /// H.264 in MP4
    H264,
    /// Motion JPEG in AVI
    Mjpeg,
}

impl VideoCodec {
    pub fn extension(self) -> &'static str {
        match self {
            VideoCodec::Mpeg4 | VideoCodec::H264 => "mp4",
            VideoCodec::Mjpeg => "avi",
        }
    }

    pub fn fourcc(self) -> &'static str {
        match self {
            VideoCodec::Mpeg4 => "mp4v",
            VideoCodec::H264 => "avc1",
            VideoCodec::Mjpeg => "MJPG",
        }
    }

    fn ffmpeg_encoder(self) -> &'static str {
        match self {
            VideoCodec::Mpeg4 => "mpeg4",
            VideoCodec::H264 => "libx264",
            VideoCodec::Mjpeg => "mjpeg",
        }
    }
}

/// Everything needed to open one camera's sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkParams {
    pub path: PathBuf,
    pub codec: VideoCodec,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// A persistent per-camera encoder
pub trait VideoSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError>;

    /// Flush and close. Only the first call has any effect.
    fn release(&mut self) -> Result<(), RecordingError>;
}

/// Creates sinks for the recorder
pub trait SinkFactory: Send + Sync {
    fn open(&self, camera: CameraId, params: &SinkParams)
        -> Result<Box<dyn VideoSink>, RecordingError>;
}

fn raw_pixel_format(channels: u8) -> &'static str {
    match channels {
        1 => "gray",
        4 => "rgba",
        _ => "rgb24",
    }
}

/// Build the ffmpeg command line for `params`
pub fn build_ffmpeg_args(params: &SinkParams) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pixel_format",
        raw_pixel_format(params.channels),
        "-video_size",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", params.width, params.height));
    args.extend(["-framerate".to_string(), params.fps.to_string()]);
    args.extend(["-i".to_string(), "-".to_string()]);
    args.extend([
        "-c:v".to_string(),
        params.codec.ffmpeg_encoder().to_string(),
    ]);

    match params.codec {
        VideoCodec::Mpeg4 => {
            args.extend(["-vtag".to_string(), params.codec.fourcc().to_string()]);
            args.extend(["-q:v".to_string(), "3".to_string()]);
            args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        }
        VideoCodec::H264 => {
            args.extend(["-preset".to_string(), "veryfast".to_string()]);
            args.extend(["-crf".to_string(), "18".to_string()]);
            args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
        }
        VideoCodec::Mjpeg => {
            args.extend(["-q:v".to_string(), "3".to_string()]);
            args.extend(["-pix_fmt".to_string(), "yuvj420p".to_string()]);
        }
    }

    args.push(params.path.to_string_lossy().to_string());
    args
}

/// FFmpeg encoder fed raw frames on stdin
pub struct FfmpegSink {
    camera: CameraId,
    process: Option<Child>,
    path: PathBuf,
    frame_bytes: usize,
    frame_count: u64,
}

impl FfmpegSink {
    pub fn spawn(binary: &str, camera: CameraId, params: &SinkParams) -> Result<Self, RecordingError> {
        let process = Command::new(binary)
            .args(build_ffmpeg_args(params))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecordingError::WriterCreate {
                camera,
                reason: format!("failed to start {}: {}", binary, e),
            })?;

        tracing::info!(
            "Started FFmpeg sink for camera {}: {}x{} @ {}fps, codec={:?}, output: {}",
            camera,
            params.width,
            params.height,
            params.fps,
            params.codec,
            params.path.display()
        );

        Ok(Self {
            camera,
            process: Some(process),
            path: params.path.clone(),
            frame_bytes: params.width as usize * params.height as usize * params.channels as usize,
            frame_count: 0,
        })
    }
}

impl VideoSink for FfmpegSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        let camera = self.camera;
        let stdin = self
            .process
            .as_mut()
            .and_then(|process| process.stdin.as_mut())
            .ok_or_else(|| RecordingError::WriterIo {
                camera,
                reason: "sink already released".to_string(),
            })?;

        if frame.data.len() != self.frame_bytes {
            tracing::debug!(
                "Camera {} frame is {} bytes, sink expects {}",
                camera,
                frame.data.len(),
                self.frame_bytes
            );
        }
        stdin
            .write_all(&frame.data)
            .map_err(|e| RecordingError::WriterIo {
                camera,
                reason: e.to_string(),
            })?;
        self.frame_count += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecordingError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        // Closing stdin signals EOF so ffmpeg finalizes the container.
        drop(process.stdin.take());
        let output = process.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                "FFmpeg sink for camera {} exited with status {}: {}",
                self.camera,
                output.status,
                stderr
            );
            return Err(RecordingError::WriterIo {
                camera: self.camera,
                reason: format!("ffmpeg exited with {}", output.status),
            });
        }
        tracing::info!(
            "FFmpeg sink for camera {} finished: {} frames, output: {}",
            self.camera,
            self.frame_count,
            self.path.display()
        );
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.process.is_some() {
            if let Err(e) = self.release() {
                tracing::warn!("Failed to release sink for camera {}: {}", self.camera, e);
            }
        }
    }
}

/// Spawns one [`FfmpegSink`] per camera
#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    binary: String,
}

impl FfmpegSinkFactory {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check that the ffmpeg binary can be run.
    pub fn probe(&self) -> Result<(), RecordingError> {
        match Command::new(&self.binary).arg("-version").output() {
            Ok(output) if output.status.success() => Ok(()),
            _ => Err(RecordingError::InvalidConfig(format!(
                "FFmpeg not found ({}). Please install FFmpeg",
                self.binary
            ))),
        }
    }
}

impl Default for FfmpegSinkFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn open(
        &self,
        camera: CameraId,
        params: &SinkParams,
    ) -> Result<Box<dyn VideoSink>, RecordingError> {
        Ok(Box::new(FfmpegSink::spawn(&self.binary, camera, params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(codec: VideoCodec) -> SinkParams {
        SinkParams {
            path: PathBuf::from("/tmp/out/session_20250101_120000_cam0.mp4"),
            codec,
            fps: 30,
            width: 1920,
            height: 1080,
            channels: 3,
        }
    }

    #[test]
    fn test_args_describe_raw_input() {
        let args = build_ffmpeg_args(&params(VideoCodec::Mpeg4));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pixel_format rgb24 -video_size 1920x1080"));
        assert!(joined.contains("-framerate 30 -i -"));
        assert!(joined.contains("-c:v mpeg4 -vtag mp4v"));
        assert_eq!(args.last().unwrap(), "/tmp/out/session_20250101_120000_cam0.mp4");
    }

    #[test]
    fn test_h264_uses_libx264() {
        let args = build_ffmpeg_args(&params(VideoCodec::H264));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
    }

    #[test]
    fn test_gray_frames_use_gray_input() {
        let mut p = params(VideoCodec::Mjpeg);
        p.channels = 1;
        let args = build_ffmpeg_args(&p);
        assert!(args.windows(2).any(|w| w[0] == "-pixel_format" && w[1] == "gray"));
    }

    #[test]
    fn test_codec_extensions() {
        assert_eq!(VideoCodec::Mpeg4.extension(), "mp4");
        assert_eq!(VideoCodec::H264.extension(), "mp4");
        assert_eq!(VideoCodec::Mjpeg.extension(), "avi");
    }

    #[test]
    fn test_missing_binary_is_a_writer_create_failure() {
        let factory = FfmpegSinkFactory::new("/nonexistent/ffmpeg-binary");
        assert!(factory.probe().is_err());
        let result = factory.open(CameraId(4), &params(VideoCodec::Mpeg4));
        assert!(matches!(
            result,
            Err(RecordingError::WriterCreate { camera: CameraId(4), .. })
        ));
    }
}
