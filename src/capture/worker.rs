//! Per-camera capture worker
//!
//! Each worker owns one capture device on a dedicated thread. The device is
//! opened on that thread when the worker starts, so an open failure is
//! reported synchronously to the caller. Once attached to a [`SyncGate`] the
//! worker loops: grab, wait for the grab rendezvous, wait for the retrieve
//! rendezvous, grab again. The dispatcher decodes the latched buffer between
//! the two waits through a [`FrameRetriever`].

use super::gate::SyncGate;
use super::traits::{CaptureDevice, DeviceOpener};
use super::types::{CameraId, CaptureConfig, Frame, MonotonicClock, RawFrame};
use crate::utils::error::CaptureError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

/// Lifecycle of a capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerState {
    /// Device open, waiting to be attached to a gate
    Init,
    Grabbing,
    AwaitGrabBarrier,
    AwaitRetrieveBarrier,
    Stopping,
    Stopped,
}

/// Buffer latched by the most recent grab
#[derive(Debug)]
struct Latched {
    raw: Option<RawFrame>,
    timestamp_ns: u64,
}

type LatchSlot = Arc<Mutex<Option<Latched>>>;

/// Dispatcher-side handle that decodes a worker's latched grab
#[derive(Clone)]
pub struct FrameRetriever {
    camera: CameraId,
    config: CaptureConfig,
    clock: MonotonicClock,
    latch: LatchSlot,
}

impl FrameRetriever {
    pub fn camera(&self) -> CameraId {
        self.camera
    }

    /// Convert the last grabbed buffer into a frame.
    ///
    /// Consumes the latch, so a second call in the same cycle yields a blank
    /// frame. Any grab or decode failure is absorbed: the result is then a
    /// zero-filled frame at the configured resolution.
    pub fn retrieve(&self) -> Frame {
        let latched = self.latch.lock().take();
        let (raw, timestamp_ns) = match latched {
            Some(Latched { raw, timestamp_ns }) => (raw, timestamp_ns),
            None => (None, self.clock.now_ns()),
        };

        let Some(raw) = raw else {
            tracing::debug!("Camera {} has no grabbed buffer, using blank frame", self.camera);
            return Frame::blank(self.config.width, self.config.height, timestamp_ns);
        };

        match raw.decode(self.camera) {
            Ok(data) => Frame {
                data,
                width: raw.width,
                height: raw.height,
                channels: 3,
                timestamp_ns,
            },
            Err(e) => {
                tracing::debug!("{}, using blank frame", e);
                Frame::blank(self.config.width, self.config.height, timestamp_ns)
            }
        }
    }
}

/// One camera's capture thread
pub struct CaptureWorker {
    camera: CameraId,
    retriever: FrameRetriever,
    state: Arc<Mutex<WorkerState>>,
    stop: Arc<AtomicBool>,
    gate_tx: Option<mpsc::Sender<Arc<SyncGate>>>,
    gate: Option<Arc<SyncGate>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    /// Open the camera on a new worker thread.
    ///
    /// Fails with [`CaptureError::DeviceOpen`] if the device cannot be opened;
    /// the thread has exited by the time the error is returned.
    pub fn start(
        camera: CameraId,
        config: CaptureConfig,
        opener: Arc<dyn DeviceOpener>,
        clock: MonotonicClock,
    ) -> Result<Self, CaptureError> {
        let latch: LatchSlot = Arc::new(Mutex::new(None));
        let state = Arc::new(Mutex::new(WorkerState::Init));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<Arc<SyncGate>>();

        let thread = {
            let latch = latch.clone();
            let state = state.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name(format!("capture-{}", camera))
                .spawn(move || {
                    let mut device = match opener.open(camera, &config) {
                        Ok(device) => {
                            let _ = ready_tx.send(Ok(()));
                            device
                        }
                        Err(e) => {
                            *state.lock() = WorkerState::Stopped;
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    // Parked until attached to a gate, or stopped.
                    if let Ok(gate) = gate_rx.recv() {
                        let ctx = LoopContext {
                            camera,
                            clock,
                            latch: &latch,
                            state: &state,
                            stop: &stop,
                            gate: &gate,
                        };
                        capture_loop(ctx, device.as_mut());
                    }

                    *state.lock() = WorkerState::Stopping;
                    device.release();
                    *state.lock() = WorkerState::Stopped;
                    tracing::debug!("Capture worker {} stopped", camera);
                })
                .map_err(|e| CaptureError::DeviceOpen {
                    camera,
                    reason: format!("cannot spawn capture thread: {}", e),
                })?
        };

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(CaptureError::DeviceOpen {
                camera,
                reason: "capture thread exited during open".to_string(),
            })
        });
        if let Err(e) = opened {
            let _ = thread.join();
            return Err(e);
        }

        tracing::info!(
            "Capture worker {} ready ({}x{} @ {}fps)",
            camera,
            config.width,
            config.height,
            config.fps
        );

        Ok(Self {
            camera,
            retriever: FrameRetriever {
                camera,
                config,
                clock,
                latch,
            },
            state,
            stop,
            gate_tx: Some(gate_tx),
            gate: None,
            thread: Some(thread),
        })
    }

    /// Begin the grab loop, rendezvousing on `gate` twice per cycle.
    pub fn attach(&mut self, gate: Arc<SyncGate>) -> Result<(), CaptureError> {
        let tx = self.gate_tx.take().ok_or(CaptureError::GateBroken)?;
        self.gate = Some(gate.clone());
        tx.send(gate).map_err(|_| CaptureError::GateBroken)
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Handle the dispatcher uses to retrieve this camera's frames.
    pub fn retriever(&self) -> FrameRetriever {
        self.retriever.clone()
    }

    /// Stop the loop, release the device and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.abort();
        }
        // Wakes a worker still parked before attach.
        self.gate_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Capture worker {} panicked", self.camera);
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext<'a> {
    camera: CameraId,
    clock: MonotonicClock,
    latch: &'a LatchSlot,
    state: &'a Mutex<WorkerState>,
    stop: &'a AtomicBool,
    gate: &'a SyncGate,
}

fn capture_loop(ctx: LoopContext<'_>, device: &mut dyn CaptureDevice) {
    let mut failed_grabs: u64 = 0;
    while !ctx.stop.load(Ordering::SeqCst) {
        *ctx.state.lock() = WorkerState::Grabbing;
        let raw = device.grab();
        let timestamp_ns = ctx.clock.now_ns();
        if raw.is_none() {
            failed_grabs += 1;
            tracing::debug!("Camera {} grab returned nothing ({} so far)", ctx.camera, failed_grabs);
        }
        *ctx.latch.lock() = Some(Latched { raw, timestamp_ns });

        *ctx.state.lock() = WorkerState::AwaitGrabBarrier;
        if ctx.gate.wait().is_err() {
            break;
        }
        *ctx.state.lock() = WorkerState::AwaitRetrieveBarrier;
        if ctx.gate.wait().is_err() {
            break;
        }
    }
    // Leaving on the stop flag must not strand peers at the gate.
    ctx.gate.abort();
}
