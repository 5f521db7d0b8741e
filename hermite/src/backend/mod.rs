//! Force evaluation backends.
//!
//! A backend keeps its own mirror of the particle rows. The integrator pushes
//! changed rows with [`ForceBackend::sync_rows`], asks for every body to be
//! predicted to the block time and then for the forces on the active set.

use std::ops::Range;

use kernels::Forces;

use crate::{error::HermiteError, store::ParticleStore};

mod cpu;
pub mod gpu;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

pub trait ForceBackend {
    fn name(&self) -> &str;

    /// Replace the whole mirror with the store contents.
    fn upload(&mut self, store: &ParticleStore) -> Result<(), HermiteError>;

    /// Push the listed rows (ascending) of `store` into the mirror.
    fn sync_rows(&mut self, store: &ParticleStore, rows: &[usize]) -> Result<(), HermiteError>;

    /// Predict every mirrored body to `t_global`.
    fn predict(&mut self, t_global: f64) -> Result<(), HermiteError>;

    /// Acceleration and jerk on each `active[k]` from all other bodies,
    /// written to `out[k]`. Uses the state from the last `predict`.
    fn compute_forces(&mut self, active: &[u32], out: &mut [Forces]) -> Result<(), HermiteError>;
}

impl<B: ForceBackend + ?Sized> ForceBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn upload(&mut self, store: &ParticleStore) -> Result<(), HermiteError> {
        (**self).upload(store)
    }

    fn sync_rows(&mut self, store: &ParticleStore, rows: &[usize]) -> Result<(), HermiteError> {
        (**self).sync_rows(store, rows)
    }

    fn predict(&mut self, t_global: f64) -> Result<(), HermiteError> {
        (**self).predict(t_global)
    }

    fn compute_forces(&mut self, active: &[u32], out: &mut [Forces]) -> Result<(), HermiteError> {
        (**self).compute_forces(active, out)
    }
}

/// Coalesce sorted row indices into contiguous ranges.
pub fn row_runs(rows: &[usize]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &row in rows {
        match runs.last_mut() {
            Some(run) if run.end == row => run.end += 1,
            _ => runs.push(row..row + 1),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_merge_neighbours() {
        assert!(row_runs(&[]).is_empty());
        assert_eq!(row_runs(&[4]), vec![4..5]);
        assert_eq!(row_runs(&[0, 1, 2, 5, 6, 9]), vec![0..3, 5..7, 9..10]);
    }
}
