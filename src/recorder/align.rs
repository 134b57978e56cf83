//! Timestamp alignment of per-camera queues
//!
//! Each camera has one pending slot holding the head entry taken from its
//! queue. Once every slot is filled the spread of their timestamps decides
//! the outcome: within the sync window the slots are committed together as
//! one batch; otherwise the single earliest entry is discarded and its
//! camera refills from its queue on the next step.
//!
//! A camera whose queue stays empty holds back every other camera. There is
//! no timeout and no partial batch.

use super::queue::{QueueSet, Stamped};
use crate::capture::types::{CameraId, Frame};
use std::collections::BTreeMap;
use std::time::Duration;

/// Frames from every camera that fell within the sync window together
#[derive(Debug, Clone)]
pub struct CommittedBatch {
    pub frames: BTreeMap<CameraId, Frame>,
    pub spread_ns: u64,
}

/// Outcome of one alignment step
#[derive(Debug, Clone)]
pub enum AlignStep {
    /// At least one camera has nothing pending yet.
    Waiting,
    Committed(CommittedBatch),
    /// The earliest pending entry was discarded unwritten.
    Dropped {
        camera: CameraId,
        timestamp_ns: u64,
        spread_ns: u64,
    },
}

/// Pending-slot alignment state for one recording session
#[derive(Debug)]
pub struct Aligner {
    window_ns: u64,
    pending: BTreeMap<CameraId, Option<Stamped>>,
    committed: u64,
    dropped: u64,
}

impl Aligner {
    pub fn new(cameras: impl IntoIterator<Item = CameraId>, window: Duration) -> Self {
        Self {
            window_ns: u64::try_from(window.as_nanos()).unwrap_or(u64::MAX),
            pending: cameras.into_iter().map(|camera| (camera, None)).collect(),
            committed: 0,
            dropped: 0,
        }
    }

    /// Run one iteration against `queues`.
    pub fn step(&mut self, queues: &QueueSet) -> AlignStep {
        for (camera, slot) in self.pending.iter_mut() {
            if slot.is_none() {
                *slot = queues.get(*camera).and_then(|queue| queue.pop());
            }
        }

        let mut earliest: Option<(CameraId, u64)> = None;
        let mut latest = 0u64;
        for (camera, slot) in &self.pending {
            let Some(stamped) = slot else {
                return AlignStep::Waiting;
            };
            if earliest.map_or(true, |(_, ts)| stamped.timestamp_ns < ts) {
                earliest = Some((*camera, stamped.timestamp_ns));
            }
            latest = latest.max(stamped.timestamp_ns);
        }
        let Some((earliest_camera, earliest_ts)) = earliest else {
            return AlignStep::Waiting;
        };
        let spread_ns = latest - earliest_ts;

        if spread_ns <= self.window_ns {
            let frames = self
                .pending
                .iter_mut()
                .filter_map(|(camera, slot)| slot.take().map(|stamped| (*camera, stamped.frame)))
                .collect();
            self.committed += 1;
            return AlignStep::Committed(CommittedBatch { frames, spread_ns });
        }

        self.pending.insert(earliest_camera, None);
        self.dropped += 1;
        AlignStep::Dropped {
            camera: earliest_camera,
            timestamp_ns: earliest_ts,
            spread_ns,
        }
    }

    /// Timestamp of the entry pending for `camera`, if any.
    pub fn pending(&self, camera: CameraId) -> Option<u64> {
        self.pending
            .get(&camera)
            .and_then(|slot| slot.as_ref())
            .map(|stamped| stamped.timestamp_ns)
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn setup(cameras: &[u32]) -> (QueueSet, Aligner) {
        let ids: Vec<_> = cameras.iter().map(|id| CameraId(*id)).collect();
        let queues = QueueSet::new(&ids, 8);
        let aligner = Aligner::new(ids, Duration::from_millis(25));
        (queues, aligner)
    }

    fn push(queues: &QueueSet, camera: u32, timestamp_ns: u64) {
        assert!(queues.enqueue(CameraId(camera), Frame::blank(2, 2, timestamp_ns), timestamp_ns));
    }

    #[test]
    fn test_frames_within_window_commit_together() {
        let (queues, mut aligner) = setup(&[0, 1]);
        push(&queues, 0, 0);
        push(&queues, 1, 10 * MS);

        match aligner.step(&queues) {
            AlignStep::Committed(batch) => {
                assert_eq!(batch.frames.len(), 2);
                assert_eq!(batch.frames[&CameraId(0)].timestamp_ns, 0);
                assert_eq!(batch.frames[&CameraId(1)].timestamp_ns, 10 * MS);
                assert_eq!(batch.spread_ns, 10 * MS);
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert!(queues.get(CameraId(0)).unwrap().is_empty());
        assert!(queues.get(CameraId(1)).unwrap().is_empty());
        assert_eq!(aligner.pending(CameraId(0)), None);
        assert_eq!(aligner.pending(CameraId(1)), None);
        assert_eq!(aligner.committed(), 1);
    }

    #[test]
    fn test_spread_equal_to_window_commits() {
        let (queues, mut aligner) = setup(&[0, 1]);
        push(&queues, 0, 100 * MS);
        push(&queues, 1, 125 * MS);
        assert!(matches!(aligner.step(&queues), AlignStep::Committed(_)));
    }

    #[test]
    fn test_divergence_drops_earliest_then_waits_for_it() {
        let (queues, mut aligner) = setup(&[0, 1]);
        push(&queues, 0, 0);
        push(&queues, 1, 50 * MS);

        match aligner.step(&queues) {
            AlignStep::Dropped {
                camera,
                timestamp_ns,
                spread_ns,
            } => {
                assert_eq!(camera, CameraId(0));
                assert_eq!(timestamp_ns, 0);
                assert_eq!(spread_ns, 50 * MS);
            }
            other => panic!("expected drop, got {:?}", other),
        }
        // Camera 1 keeps its pending entry; camera 0 has nothing to offer.
        assert_eq!(aligner.pending(CameraId(1)), Some(50 * MS));
        assert!(matches!(aligner.step(&queues), AlignStep::Waiting));

        push(&queues, 0, 45 * MS);
        match aligner.step(&queues) {
            AlignStep::Committed(batch) => {
                assert_eq!(batch.frames[&CameraId(0)].timestamp_ns, 45 * MS);
                assert_eq!(batch.frames[&CameraId(1)].timestamp_ns, 50 * MS);
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert_eq!(aligner.dropped(), 1);
    }

    #[test]
    fn test_only_one_camera_dropped_per_step() {
        let (queues, mut aligner) = setup(&[0, 1, 2]);
        push(&queues, 0, 0);
        push(&queues, 1, 5 * MS);
        push(&queues, 2, 100 * MS);

        assert!(matches!(
            aligner.step(&queues),
            AlignStep::Dropped { camera: CameraId(0), .. }
        ));
        assert_eq!(aligner.pending(CameraId(1)), Some(5 * MS));
        assert_eq!(aligner.pending(CameraId(2)), Some(100 * MS));
    }

    #[test]
    fn test_huge_window_saturates_instead_of_wrapping() {
        let queues = QueueSet::new(&[CameraId(0), CameraId(1)], 8);
        let mut aligner = Aligner::new([CameraId(0), CameraId(1)], Duration::from_millis(u64::MAX));
        push(&queues, 0, 0);
        push(&queues, 1, u64::MAX / 2);
        assert!(matches!(aligner.step(&queues), AlignStep::Committed(_)));
    }

    #[test]
    fn test_lagging_empty_camera_stalls_alignment_indefinitely() {
        let (queues, mut aligner) = setup(&[0, 1]);
        for i in 0..8 {
            push(&queues, 1, i * 33 * MS);
        }

        // Camera 0 never delivers: nothing commits and nothing is dropped,
        // however long the loop keeps stepping.
        for _ in 0..1_000 {
            assert!(matches!(aligner.step(&queues), AlignStep::Waiting));
        }
        assert_eq!(aligner.pending(CameraId(1)), Some(0));
        assert_eq!(queues.get(CameraId(1)).unwrap().len(), 7);
        assert_eq!(aligner.committed(), 0);
        assert_eq!(aligner.dropped(), 0);
    }
}
