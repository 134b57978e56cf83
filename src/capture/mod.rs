//! Synchronized multi-camera capture
//!
//! One worker thread per camera grabs in lockstep with its peers through a
//! two-phase [`SyncGate`]; a single [`Dispatcher`] retrieves and publishes
//! one [`FrameBatch`] per cycle.

pub mod device;
pub mod dispatcher;
pub mod gate;
pub mod pipeline;
pub mod traits;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{list_cameras, NokhwaDevice, NokhwaOpener};
pub use dispatcher::{BatchConsumer, Dispatcher};
pub use gate::SyncGate;
pub use pipeline::CapturePipeline;
pub use traits::{CameraInfo, CaptureDevice, DeviceOpener};
pub use types::{CameraId, CaptureBackend, CaptureConfig, Frame, FrameBatch, MonotonicClock};
pub use worker::{CaptureWorker, FrameRetriever, WorkerState};
