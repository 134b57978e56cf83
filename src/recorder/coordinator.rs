//! Recording coordinator
//!
//! Owns the recording session lifecycle: per-camera queues fed by the
//! dispatcher, the alignment thread that commits or drops pending frames,
//! and the lazily created per-camera video sinks.

use super::align::{AlignStep, Aligner, CommittedBatch};
use super::queue::QueueSet;
use super::sink::{SinkFactory, SinkParams, VideoSink};
use super::state::{
    RecordingSession, RecordingState, RecordingSummary, SessionConfig, SessionHandle,
};
use crate::capture::dispatcher::BatchConsumer;
use crate::capture::types::{CameraId, Frame, FrameBatch};
use crate::utils::error::RecordingError;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::broadcast;

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Started(SessionHandle),
    Stopped(SessionHandle),
    /// One camera's sink could not be created or written. The others continue.
    WriterFailed { camera: CameraId, reason: String },
}

enum WriterSlot {
    Open {
        sink: Box<dyn VideoSink>,
        dims: (u32, u32),
        path: PathBuf,
    },
    Failed,
}

/// Per-camera sinks of one session, created on first write
struct SessionWriters {
    session: RecordingSession,
    factory: Arc<dyn SinkFactory>,
    events: broadcast::Sender<RecordingEvent>,
    slots: BTreeMap<CameraId, WriterSlot>,
    frames: BTreeMap<CameraId, u64>,
    files: Vec<PathBuf>,
}

impl SessionWriters {
    fn new(
        session: RecordingSession,
        factory: Arc<dyn SinkFactory>,
        events: broadcast::Sender<RecordingEvent>,
    ) -> Self {
        Self {
            session,
            factory,
            events,
            slots: BTreeMap::new(),
            frames: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    fn write_batch(&mut self, batch: CommittedBatch) {
        for (camera, frame) in batch.frames {
            self.write(camera, frame);
        }
    }

    fn write(&mut self, camera: CameraId, frame: Frame) {
        if !self.slots.contains_key(&camera) {
            let slot = self.open(camera, &frame);
            self.slots.insert(camera, slot);
        }

        let failure = match self.slots.get_mut(&camera) {
            Some(WriterSlot::Open { sink, dims, .. }) => {
                let result = if frame.dimensions() == *dims {
                    sink.write(&frame)
                } else {
                    sink.write(&rescale(&frame, *dims))
                };
                match result {
                    Ok(()) => {
                        *self.frames.entry(camera).or_default() += 1;
                        None
                    }
                    Err(e) => {
                        if let Err(release_err) = sink.release() {
                            tracing::warn!(
                                "Failed to release sink for camera {}: {}",
                                camera,
                                release_err
                            );
                        }
                        Some(e)
                    }
                }
            }
            _ => None,
        };

        if let Some(e) = failure {
            tracing::error!("Stopped recording camera {}: {}", camera, e);
            self.slots.insert(camera, WriterSlot::Failed);
            let _ = self.events.send(RecordingEvent::WriterFailed {
                camera,
                reason: e.to_string(),
            });
        }
    }

    fn open(&mut self, camera: CameraId, frame: &Frame) -> WriterSlot {
        let params = SinkParams {
            path: self.session.output_path(camera),
            codec: self.session.config.codec,
            fps: self.session.config.fps,
            width: frame.width,
            height: frame.height,
            channels: frame.channels,
        };
        match self.factory.open(camera, &params) {
            Ok(sink) => {
                tracing::info!(
                    "Opened writer for camera {} at {}x{}: {}",
                    camera,
                    params.width,
                    params.height,
                    params.path.display()
                );
                self.files.push(params.path.clone());
                WriterSlot::Open {
                    sink,
                    dims: frame.dimensions(),
                    path: params.path,
                }
            }
            Err(e) => {
                tracing::error!("Cannot record camera {}: {}", camera, e);
                let _ = self.events.send(RecordingEvent::WriterFailed {
                    camera,
                    reason: e.to_string(),
                });
                WriterSlot::Failed
            }
        }
    }

    /// Release every open sink exactly once.
    fn release_all(&mut self) {
        for (camera, slot) in std::mem::take(&mut self.slots) {
            if let WriterSlot::Open { mut sink, path, .. } = slot {
                match sink.release() {
                    Ok(()) => tracing::debug!("Released writer for camera {}: {}", camera, path.display()),
                    Err(e) => tracing::warn!("Failed to release sink for camera {}: {}", camera, e),
                }
            }
        }
    }
}

/// Nearest-neighbour resample to the dimensions a sink was opened with
fn rescale(frame: &Frame, (width, height): (u32, u32)) -> Frame {
    let channels = frame.channels as usize;
    let mut data = vec![0u8; width as usize * height as usize * channels];
    if frame.width > 0 && frame.height > 0 {
        for y in 0..height as usize {
            let src_y = y * frame.height as usize / height as usize;
            for x in 0..width as usize {
                let src_x = x * frame.width as usize / width as usize;
                let src = (src_y * frame.width as usize + src_x) * channels;
                let dst = (y * width as usize + x) * channels;
                if let Some(pixel) = frame.data.get(src..src + channels) {
                    data[dst..dst + channels].copy_from_slice(pixel);
                }
            }
        }
    }
    Frame {
        data,
        width,
        height,
        channels: frame.channels,
        timestamp_ns: frame.timestamp_ns,
    }
}

struct AlignOutcome {
    writers: SessionWriters,
    committed: u64,
    dropped: u64,
}

fn align_loop(
    queues: Arc<QueueSet>,
    mut writers: SessionWriters,
    stop: Arc<AtomicBool>,
) -> AlignOutcome {
    let config = &writers.session.config;
    let poll_interval = config.poll_interval;
    let mut aligner = Aligner::new(config.cameras.iter().copied(), config.sync_window);

    while !stop.load(Ordering::SeqCst) {
        match aligner.step(&queues) {
            AlignStep::Waiting => std::thread::sleep(poll_interval),
            AlignStep::Committed(batch) => {
                tracing::trace!("Committed batch with spread {}ns", batch.spread_ns);
                writers.write_batch(batch);
            }
            AlignStep::Dropped {
                camera,
                timestamp_ns,
                spread_ns,
            } => {
                tracing::trace!(
                    "Dropped stale frame from camera {} at {}ns (spread {}ns)",
                    camera,
                    timestamp_ns,
                    spread_ns
                );
            }
        }
    }

    AlignOutcome {
        writers,
        committed: aligner.committed(),
        dropped: aligner.dropped(),
    }
}

struct ActiveSession {
    handle: SessionHandle,
    queues: Arc<QueueSet>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<AlignOutcome>,
    started: Instant,
}

/// Aligns frames from every camera and writes one file per camera
pub struct Recorder {
    sinks: Arc<dyn SinkFactory>,
    state: Arc<RwLock<RecordingState>>,
    active: Mutex<Option<ActiveSession>>,
    /// Queues of the active session, `None` while idle
    queues: RwLock<Option<Arc<QueueSet>>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl Recorder {
    pub fn new(sinks: Arc<dyn SinkFactory>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            sinks,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            active: Mutex::new(None),
            queues: RwLock::new(None),
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub fn active_session(&self) -> Option<SessionHandle> {
        self.active.lock().as_ref().map(|active| active.handle)
    }

    /// Start a session
    pub fn start(&self, config: SessionConfig) -> Result<SessionHandle, RecordingError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        config.validate()?;
        std::fs::create_dir_all(&config.output_dir)?;

        let session = RecordingSession::new(config);
        let handle = session.handle;
        let queues = Arc::new(QueueSet::new(
            &session.config.cameras,
            session.config.queue_capacity,
        ));
        tracing::info!(
            "Starting recording {} of {} camera(s) to {} (window {:?}, queue {})",
            handle,
            session.config.cameras.len(),
            session.config.output_dir.display(),
            session.config.sync_window,
            session.config.queue_capacity
        );

        let stop = Arc::new(AtomicBool::new(false));
        let writers = SessionWriters::new(session, self.sinks.clone(), self.event_tx.clone());
        let thread = {
            let queues = queues.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("recorder-align".to_string())
                .spawn(move || align_loop(queues, writers, stop))?
        };

        *self.queues.write() = Some(queues.clone());
        *active = Some(ActiveSession {
            handle,
            queues,
            stop,
            thread,
            started: Instant::now(),
        });
        *self.state.write() = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started(handle));
        Ok(handle)
    }

    /// Queue a frame for alignment. Returns false when no session is
    /// active or the camera is not part of it.
    pub fn enqueue(&self, camera: CameraId, frame: Frame, timestamp_ns: u64) -> bool {
        match self.queues.read().as_ref() {
            Some(queues) => queues.enqueue(camera, frame, timestamp_ns),
            None => false,
        }
    }

    /// Stop the session identified by `handle`, flushing and releasing
    /// every sink before returning.
    ///
    /// Returns `Ok(None)` if `handle` is not the active session, including
    /// a session that has already been stopped.
    pub fn stop(&self, handle: SessionHandle) -> Result<Option<RecordingSummary>, RecordingError> {
        let mut active = self.active.lock();
        if active.as_ref().map(|session| session.handle) != Some(handle) {
            return Ok(None);
        }
        let Some(session) = active.take() else {
            return Ok(None);
        };

        *self.state.write() = RecordingState::Stopping;
        *self.queues.write() = None;
        session.stop.store(true, Ordering::SeqCst);

        let outcome = session.thread.join();
        let evictions = session.queues.evictions();
        drop(session.queues);
        let Ok(mut outcome) = outcome else {
            *self.state.write() = RecordingState::Idle;
            tracing::error!("Alignment thread for recording {} panicked", handle);
            return Err(RecordingError::AlignmentPanicked);
        };
        outcome.writers.release_all();

        let summary = RecordingSummary {
            handle,
            files: outcome.writers.files,
            frames_written: outcome.writers.frames,
            committed: outcome.committed,
            dropped: outcome.dropped,
            evictions,
            duration: session.started.elapsed(),
        };

        *self.state.write() = RecordingState::Idle;
        let _ = self.event_tx.send(RecordingEvent::Stopped(handle));
        tracing::info!(
            "Recording stopped. Duration: {}, {} batches written, {} stale frames dropped",
            summary.duration_hms(),
            summary.committed,
            summary.dropped
        );
        Ok(Some(summary))
    }

    /// Stop whatever session is active.
    pub fn stop_active(&self) -> Result<Option<RecordingSummary>, RecordingError> {
        match self.active_session() {
            Some(handle) => self.stop(handle),
            None => Ok(None),
        }
    }
}

impl BatchConsumer for Recorder {
    fn on_frame_batch(&self, batch: &FrameBatch) {
        if let Some(queues) = self.queues.read().as_ref() {
            queues.on_frame_batch(batch);
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop_active() {
            tracing::error!("Failed to stop recording on drop: {}", e);
        }
    }
}
