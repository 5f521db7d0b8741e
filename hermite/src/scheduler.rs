//! Block selection for the individual time-step scheme.

use crate::store::ParticleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting to pick the next block.
    Selecting,
    /// A block is selected and being integrated to `t_next`.
    Advancing,
}

/// Tracks the global clock and the particles due at the next block time.
#[derive(Debug, Clone)]
pub struct BlockScheduler {
    phase: Phase,
    t_global: f64,
    t_next: f64,
    tick: u64,
    active: Vec<u32>,
}

impl Default for BlockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockScheduler {
    pub fn new() -> Self {
        Self {
            phase: Phase::Selecting,
            t_global: 0.0,
            t_next: 0.0,
            tick: 0,
            active: Vec::new(),
        }
    }

    /// Pick every particle with `t_i + dt_i` equal to the minimum over the
    /// store, in ascending index order. Returns the block time.
    pub fn select(&mut self, store: &ParticleStore) -> f64 {
        debug_assert_eq!(self.phase, Phase::Selecting);
        let t_next = store.next_block_time();

        self.active.clear();
        self.active.extend(
            store
                .times()
                .iter()
                .zip(store.steps())
                .enumerate()
                .filter(|(_, (t, dt))| *t + *dt == t_next)
                .map(|(i, _)| i as u32),
        );
        self.t_next = t_next;
        self.phase = Phase::Advancing;
        t_next
    }

    /// Close the current block: the global clock moves to the block time.
    pub fn advance(&mut self) {
        debug_assert_eq!(self.phase, Phase::Advancing);
        self.t_global = self.t_next;
        self.tick += 1;
        self.phase = Phase::Selecting;
    }

    pub fn active(&self) -> &[u32] {
        &self.active
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn t_global(&self) -> f64 {
        self.t_global
    }

    pub fn t_next(&self) -> f64 {
        self.t_next
    }

    /// Blocks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}
