//! Capture pipeline assembly
//!
//! Opens one worker per camera, sizes the sync gate to the cameras that
//! actually opened, and starts the dispatcher. A camera that fails to open
//! is left out of the session; the others run normally.

use super::dispatcher::{BatchConsumer, Dispatcher};
use super::gate::SyncGate;
use super::traits::DeviceOpener;
use super::types::{CameraId, CaptureConfig, MonotonicClock};
use super::worker::{CaptureWorker, WorkerState};
use crate::utils::error::CaptureError;
use std::sync::Arc;

/// Running set of synchronized capture workers
pub struct CapturePipeline {
    workers: Vec<CaptureWorker>,
    dispatcher: Dispatcher,
    gate: Arc<SyncGate>,
    failed: Vec<CaptureError>,
    stopped: bool,
}

impl CapturePipeline {
    pub fn start(
        cameras: &[(CameraId, CaptureConfig)],
        opener: Arc<dyn DeviceOpener>,
        consumers: Vec<Arc<dyn BatchConsumer>>,
    ) -> Result<Self, CaptureError> {
        let clock = MonotonicClock::new();
        let mut workers = Vec::with_capacity(cameras.len());
        let mut failed = Vec::new();

        for (camera, config) in cameras {
            match CaptureWorker::start(*camera, *config, opener.clone(), clock) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    tracing::warn!("Skipping camera {}: {}", camera, e);
                    failed.push(e);
                }
            }
        }

        if workers.is_empty() {
            return Err(CaptureError::NoCameras);
        }

        let gate = Arc::new(SyncGate::new(workers.len()));
        let retrievers = workers.iter().map(|worker| worker.retriever()).collect();
        let dispatcher = Dispatcher::spawn(retrievers, gate.clone(), consumers)?;
        for worker in &mut workers {
            worker.attach(gate.clone())?;
        }

        tracing::info!(
            "Capture pipeline started with {} camera(s), {} skipped",
            workers.len(),
            failed.len()
        );

        Ok(Self {
            workers,
            dispatcher,
            gate,
            failed,
            stopped: false,
        })
    }

    /// Cameras taking part in the rendezvous, in ascending order.
    pub fn cameras(&self) -> Vec<CameraId> {
        let mut cameras: Vec<_> = self.workers.iter().map(|w| w.camera()).collect();
        cameras.sort();
        cameras
    }

    /// Open failures for cameras left out of the pipeline.
    pub fn failed(&self) -> &[CaptureError] {
        &self.failed
    }

    pub fn cycles(&self) -> u64 {
        self.dispatcher.cycles()
    }

    pub fn worker_states(&self) -> Vec<(CameraId, WorkerState)> {
        self.workers.iter().map(|w| (w.camera(), w.state())).collect()
    }

    /// Abort the gate, then join the dispatcher and every worker. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.gate.abort();
        self.dispatcher.stop();
        for worker in &mut self.workers {
            worker.stop();
        }
        tracing::info!(
            "Capture pipeline stopped after {} cycles",
            self.dispatcher.cycles()
        );
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::ScriptedOpener;
    use crate::capture::types::FrameBatch;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Timestamps {
        per_camera: Mutex<BTreeMap<CameraId, Vec<u64>>>,
        batches: Mutex<u64>,
    }

    impl BatchConsumer for Timestamps {
        fn on_frame_batch(&self, batch: &FrameBatch) {
            let mut per_camera = self.per_camera.lock();
            for (camera, frame) in &batch.frames {
                per_camera.entry(*camera).or_default().push(frame.timestamp_ns);
            }
            *self.batches.lock() += 1;
        }
    }

    fn cameras(ids: &[u32]) -> Vec<(CameraId, CaptureConfig)> {
        ids.iter()
            .map(|id| {
                (
                    CameraId(*id),
                    CaptureConfig {
                        width: 2,
                        height: 2,
                        ..CaptureConfig::default()
                    },
                )
            })
            .collect()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_every_camera_delivers_once_per_cycle_in_order() {
        let opener = Arc::new(ScriptedOpener::new());
        let consumer = Arc::new(Timestamps::default());
        let consumers = vec![consumer.clone() as Arc<dyn BatchConsumer>];
        let mut pipeline = CapturePipeline::start(&cameras(&[0, 1, 2]), opener, consumers).unwrap();

        wait_for(|| *consumer.batches.lock() >= 20);
        pipeline.stop();

        let batches = *consumer.batches.lock();
        let per_camera = consumer.per_camera.lock();
        assert_eq!(per_camera.len(), 3);
        for timestamps in per_camera.values() {
            assert_eq!(timestamps.len() as u64, batches);
            assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        }
        assert_eq!(pipeline.cycles(), batches);
    }

    #[test]
    fn test_camera_that_fails_to_open_is_skipped() {
        let opener = Arc::new(ScriptedOpener::new().failing(CameraId(1)));
        let mut pipeline = CapturePipeline::start(&cameras(&[0, 1, 2]), opener, Vec::new()).unwrap();
        assert_eq!(pipeline.cameras(), vec![CameraId(0), CameraId(2)]);
        assert_eq!(pipeline.failed().len(), 1);
        pipeline.stop();
    }

    #[test]
    fn test_no_openable_camera_is_an_error() {
        let opener = Arc::new(ScriptedOpener::new().failing(CameraId(0)));
        let result = CapturePipeline::start(&cameras(&[0]), opener, Vec::new());
        assert!(matches!(result, Err(CaptureError::NoCameras)));
    }

    #[test]
    fn test_stop_reaches_released_state_in_bounded_time() {
        let opener = Arc::new(ScriptedOpener::new().with_grab_delay(Duration::from_millis(5)));
        let mut pipeline = CapturePipeline::start(&cameras(&[0, 1]), opener.clone(), Vec::new()).unwrap();
        wait_for(|| pipeline.cycles() >= 3);

        let start = Instant::now();
        pipeline.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        pipeline.stop();

        for (_, state) in pipeline.worker_states() {
            assert_eq!(state, WorkerState::Stopped);
        }
        assert_eq!(opener.releases(CameraId(0)), 1);
        assert_eq!(opener.releases(CameraId(1)), 1);
    }
}
