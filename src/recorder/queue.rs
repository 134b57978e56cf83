//! Bounded per-camera frame queues
//!
//! The only structure shared between the dispatcher (producer) and the
//! alignment thread (consumer). Pushing never waits for space: a full queue
//! evicts its oldest entry first.

use crate::capture::dispatcher::BatchConsumer;
use crate::capture::types::{CameraId, Frame, FrameBatch};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// A frame tagged with the timestamp used for alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped {
    pub timestamp_ns: u64,
    pub frame: Frame,
}

/// Drop-oldest FIFO with a fixed capacity
#[derive(Debug)]
pub struct PerCameraQueue {
    capacity: usize,
    items: Mutex<VecDeque<Stamped>>,
    evictions: AtomicU64,
}

impl PerCameraQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    /// Append `item`, evicting the oldest entry if the queue is full.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&self, item: Stamped) -> Option<Stamped> {
        let mut items = self.items.lock();
        let evicted = if items.len() >= self.capacity {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        evicted
    }

    pub fn pop(&self) -> Option<Stamped> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries discarded to make room since the queue was created.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// One queue per recorded camera
#[derive(Debug)]
pub struct QueueSet {
    queues: BTreeMap<CameraId, PerCameraQueue>,
}

impl QueueSet {
    pub fn new(cameras: &[CameraId], capacity: usize) -> Self {
        Self {
            queues: cameras
                .iter()
                .map(|camera| (*camera, PerCameraQueue::new(capacity)))
                .collect(),
        }
    }

    /// Queue `frame` for `camera`. Unknown cameras are ignored.
    pub fn enqueue(&self, camera: CameraId, frame: Frame, timestamp_ns: u64) -> bool {
        let Some(queue) = self.queues.get(&camera) else {
            return false;
        };
        if let Some(evicted) = queue.push(Stamped {
            timestamp_ns,
            frame,
        }) {
            tracing::trace!(
                "Queue for camera {} full, evicted frame at {}ns",
                camera,
                evicted.timestamp_ns
            );
        }
        true
    }

    pub fn get(&self, camera: CameraId) -> Option<&PerCameraQueue> {
        self.queues.get(&camera)
    }

    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.queues.keys().copied()
    }

    pub fn evictions(&self) -> BTreeMap<CameraId, u64> {
        self.queues
            .iter()
            .map(|(camera, queue)| (*camera, queue.evictions()))
            .collect()
    }
}

impl BatchConsumer for QueueSet {
    fn on_frame_batch(&self, batch: &FrameBatch) {
        for (camera, frame) in &batch.frames {
            self.enqueue(*camera, frame.clone(), frame.timestamp_ns);
        }
    }
}
