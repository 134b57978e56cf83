//! Retrieve-and-publish half of the capture cycle
//!
//! After the grab rendezvous the dispatcher retrieves every camera's frame in
//! ascending camera order, assembles a [`FrameBatch`] and hands it to each
//! consumer before releasing the workers through the retrieve rendezvous.
//! Consumers run on the dispatcher thread and must return promptly.

use super::gate::SyncGate;
use super::types::FrameBatch;
use super::worker::FrameRetriever;
use crate::utils::error::CaptureError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Receives one batch per capture cycle.
///
/// The batch is only borrowed for the duration of the call; implementations
/// copy whatever they keep.
pub trait BatchConsumer: Send + Sync {
    fn on_frame_batch(&self, batch: &FrameBatch);
}

/// Retrieve every camera's latched grab and publish the batch.
pub fn dispatch_cycle(
    retrievers: &[FrameRetriever],
    consumers: &[Arc<dyn BatchConsumer>],
    cycle: u64,
) -> FrameBatch {
    let frames: BTreeMap<_, _> = retrievers
        .iter()
        .map(|retriever| (retriever.camera(), retriever.retrieve()))
        .collect();
    let batch = FrameBatch { cycle, frames };
    for consumer in consumers {
        consumer.on_frame_batch(&batch);
    }
    batch
}

/// Thread driving the retrieve phase of every cycle
pub struct Dispatcher {
    gate: Arc<SyncGate>,
    stop: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(
        mut retrievers: Vec<FrameRetriever>,
        gate: Arc<SyncGate>,
        consumers: Vec<Arc<dyn BatchConsumer>>,
    ) -> Result<Self, CaptureError> {
        retrievers.sort_by_key(|retriever| retriever.camera());
        let stop = Arc::new(AtomicBool::new(false));
        let cycles = Arc::new(AtomicU64::new(0));

        let thread = {
            let gate = gate.clone();
            let stop = stop.clone();
            let cycles = cycles.clone();
            std::thread::Builder::new()
                .name("capture-dispatch".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        if gate.wait().is_err() {
                            break;
                        }
                        let cycle = cycles.load(Ordering::SeqCst);
                        dispatch_cycle(&retrievers, &consumers, cycle);
                        cycles.fetch_add(1, Ordering::SeqCst);
                        if gate.wait().is_err() {
                            break;
                        }
                    }
                    gate.abort();
                    tracing::debug!(
                        "Dispatcher stopped after {} cycles",
                        cycles.load(Ordering::SeqCst)
                    );
                })
                .map_err(|e| CaptureError::ThreadSpawn {
                    thread: "capture-dispatch".to_string(),
                    reason: e.to_string(),
                })?
        };

        Ok(Self {
            gate,
            stop,
            cycles,
            thread: Some(thread),
        })
    }

    /// Number of batches published so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Abort the gate and join. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.gate.abort();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
