//! Two-phase rendezvous between capture workers and the dispatcher
//!
//! A cyclic barrier for `workers + 1` parties. Each capture cycle passes it
//! twice: once after every worker has grabbed (releasing the dispatcher to
//! retrieve), and once after the dispatcher has published (releasing the
//! workers to grab again). Aborting breaks the gate for good and wakes every
//! waiter with [`CaptureError::GateBroken`].

use crate::utils::error::CaptureError;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    arrived: usize,
    generation: u64,
    broken: bool,
}

/// Reusable N+1 party barrier with broadcast abort
#[derive(Debug)]
pub struct SyncGate {
    parties: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

impl SyncGate {
    /// Gate for `workers` capture workers plus one dispatcher.
    pub fn new(workers: usize) -> Self {
        Self {
            parties: workers + 1,
            state: Mutex::new(GateState::default()),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Block until every party has arrived.
    ///
    /// Returns the generation that was completed. Fails immediately if the
    /// gate is already broken, or as soon as it is broken while waiting.
    pub fn wait(&self) -> Result<u64, CaptureError> {
        let mut state = self.state.lock();
        if state.broken {
            return Err(CaptureError::GateBroken);
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(generation);
        }

        // A completed generation wins over a later abort.
        while state.generation == generation {
            if state.broken {
                return Err(CaptureError::GateBroken);
            }
            self.released.wait(&mut state);
        }
        Ok(generation)
    }

    /// Break the gate and release every current and future waiter.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if !state.broken {
            tracing::debug!(
                "Sync gate aborted ({} of {} parties waiting)",
                state.arrived,
                self.parties
            );
        }
        state.broken = true;
        self.released.notify_all();
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }
}
