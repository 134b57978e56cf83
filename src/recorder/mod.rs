//! Recording system module
//!
//! - Bounded drop-oldest queues fed by the capture dispatcher
//! - Timestamp-window alignment across cameras
//! - Recorder to run sessions and own the per-camera video sinks

pub mod align;
pub mod coordinator;
pub mod queue;
pub mod sink;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use align::{AlignStep, Aligner, CommittedBatch};
pub use coordinator::{Recorder, RecordingEvent};
pub use queue::{PerCameraQueue, QueueSet, Stamped};
pub use sink::{FfmpegSink, FfmpegSinkFactory, SinkFactory, SinkParams, VideoCodec, VideoSink};
pub use state::{RecordingSession, RecordingState, RecordingSummary, SessionConfig, SessionHandle};
