use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use cgmath::{Point3, Vector3};

use crate::diagnostics::Energy;

/// State of the whole system at one global time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tick: u64,
    pub t_global: f64,
    pub energy: Energy,
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
}

/// Primitive for handing snapshots from the integrating thread to an observer.
pub struct SnapshotExchange {
    sample: Mutex<Option<Snapshot>>,
    should_sample: AtomicBool,
    simulation_tick: AtomicU64,
    finished: AtomicBool,
}

impl Default for SnapshotExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotExchange {
    pub fn new() -> Self {
        Self {
            sample: Mutex::new(None),
            should_sample: AtomicBool::new(true),
            simulation_tick: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Return whether we are ready to accept a new snapshot.
    pub fn should_store(&self) -> bool {
        self.should_sample
            .compare_exchange_weak(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Publish a snapshot, replacing any that was not collected.
    pub fn store(&self, snapshot: Snapshot) {
        self.simulation_tick.store(snapshot.tick, Ordering::Relaxed);
        *self.sample.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Take the latest snapshot, if any, and request a new one.
    pub fn sample(&self) -> Option<Snapshot> {
        let snapshot = self
            .sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.should_sample.store(true, Ordering::Relaxed);
        snapshot
    }

    pub fn current_ticks(&self) -> u64 {
        self.simulation_tick.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
