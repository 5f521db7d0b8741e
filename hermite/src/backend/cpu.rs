use kernels::{Body, Forces, Predictor, interact, partition_range, predict};
use rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{
        IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator,
        ParallelIterator,
    },
    slice::ParallelSliceMut,
};

use crate::{
    backend::ForceBackend, config::SimulationConfig, constants::OBJECTS_PER_THREAD,
    error::HermiteError, store::ParticleStore,
};

fn compute_target_threads(n_objects: usize, max_threads: usize) -> usize {
    n_objects.div_ceil(OBJECTS_PER_THREAD).clamp(1, max_threads)
}

/// Direct summation on a rayon pool, laid out like the GPU kernels: one
/// partial sum per j-partition, each partition walked in tiles, then reduced
/// in partition order.
pub struct CpuBackend {
    bodies: Vec<Body>,
    predicted: Vec<Predictor>,
    partial: Vec<Forces>,
    softening2: f64,
    g: f64,
    block_size: usize,
    j_partitions: usize,
    pool: ThreadPool,
}

impl CpuBackend {
    pub fn new(config: &SimulationConfig, n_objects: usize) -> Result<Self, HermiteError> {
        let n_threads = compute_target_threads(n_objects, config.threads);
        log::debug!("cpu backend: {n_threads} threads for {n_objects} particles");

        Ok(Self {
            bodies: Vec::new(),
            predicted: Vec::new(),
            partial: Vec::new(),
            softening2: config.softening2,
            g: config.g,
            block_size: config.block_size,
            j_partitions: config.j_partitions,
            pool: ThreadPoolBuilder::new().num_threads(n_threads).build()?,
        })
    }

    /// The mirrored rows as last synchronised.
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn predicted(&self) -> &[Predictor] {
        &self.predicted
    }
}

impl ForceBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn upload(&mut self, store: &ParticleStore) -> Result<(), HermiteError> {
        self.bodies = store.device_rows();
        self.predicted = vec![Predictor::default(); self.bodies.len()];
        Ok(())
    }

    fn sync_rows(&mut self, store: &ParticleStore, rows: &[usize]) -> Result<(), HermiteError> {
        for &i in rows {
            self.bodies[i] = store.device_row(i);
        }
        Ok(())
    }

    fn predict(&mut self, t_global: f64) -> Result<(), HermiteError> {
        let Self {
            bodies,
            predicted,
            pool,
            ..
        } = self;
        pool.install(|| {
            bodies
                .par_iter()
                .zip(predicted.par_iter_mut())
                .for_each(|(body, out)| *out = predict(body, t_global));
        });
        Ok(())
    }

    fn compute_forces(&mut self, active: &[u32], out: &mut [Forces]) -> Result<(), HermiteError> {
        let n_active = active.len();
        if n_active == 0 {
            return Ok(());
        }
        let Self {
            predicted,
            partial,
            softening2,
            g,
            block_size,
            j_partitions,
            pool,
            ..
        } = self;
        let (softening2, g, block_size, parts) = (*softening2, *g, *block_size, *j_partitions);
        let n = predicted.len() as u32;
        let predicted = &predicted[..];

        partial.clear();
        partial.resize(parts * n_active, Forces::ZERO);

        pool.install(|| {
            partial
                .par_chunks_mut(n_active)
                .enumerate()
                .for_each(|(p, row)| {
                    let (start, end) = partition_range(p as u32, parts as u32, n);
                    let (start, end) = (start as usize, end as usize);
                    row.par_iter_mut().enumerate().for_each(|(ii, slot)| {
                        let i = active[ii] as usize;
                        let pi = &predicted[i];
                        let mut acc = Forces::ZERO;
                        let mut base = start;
                        while base < end {
                            let tile = &predicted[base..(base + block_size).min(end)];
                            for (k, pj) in tile.iter().enumerate() {
                                if base + k != i {
                                    interact(pi, pj, softening2, g, &mut acc);
                                }
                            }
                            base += block_size;
                        }
                        *slot = acc;
                    });
                });

            let partial = &partial[..];
            out[..n_active]
                .par_iter_mut()
                .enumerate()
                .for_each(|(ii, f)| {
                    let mut acc = Forces::ZERO;
                    for p in 0..parts {
                        acc.accumulate(&partial[p * n_active + ii]);
                    }
                    *f = acc;
                });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point3, Vector3};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::store::ParticleInit;

    fn random_store(n: usize, seed: u64) -> ParticleStore {
        let mut rng = StdRng::seed_from_u64(seed);
        let input: Vec<_> = (0..n)
            .map(|_| ParticleInit {
                mass: rng.random_range(0.1..1.0),
                pos: Point3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                ),
                vel: Vector3::new(
                    rng.random_range(-0.5..0.5),
                    rng.random_range(-0.5..0.5),
                    rng.random_range(-0.5..0.5),
                ),
            })
            .collect();
        ParticleStore::load(&input).unwrap()
    }

    fn naive(predicted: &[Predictor], i: usize, e2: f64) -> Forces {
        let mut acc = Forces::ZERO;
        for (j, pj) in predicted.iter().enumerate() {
            if j != i {
                interact(&predicted[i], pj, e2, 1.0, &mut acc);
            }
        }
        acc
    }

    #[test]
    fn target_threads_are_bounded() {
        assert_eq!(compute_target_threads(1, 20), 1);
        assert_eq!(compute_target_threads(257, 20), 2);
        assert_eq!(compute_target_threads(1_000_000, 20), 20);
    }

    #[test]
    fn partitioned_sum_matches_naive_sum() {
        let store = random_store(203, 7);
        for (block_size, j_partitions) in [(32, 16), (64, 3), (256, 1)] {
            let config = SimulationConfig {
                softening2: 1e-4,
                block_size,
                j_partitions,
                ..Default::default()
            };
            let mut backend = CpuBackend::new(&config, store.len()).unwrap();
            backend.upload(&store).unwrap();
            backend.predict(0.0).unwrap();

            let active: Vec<u32> = (0..store.len() as u32).step_by(5).collect();
            let mut out = vec![Forces::ZERO; active.len()];
            backend.compute_forces(&active, &mut out).unwrap();

            for (k, &i) in active.iter().enumerate() {
                let expected = naive(backend.predicted(), i as usize, 1e-4);
                for c in 0..3 {
                    assert!((out[k].a[c] - expected.a[c]).abs() < 1e-10);
                    assert!((out[k].a1[c] - expected.a1[c]).abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn partitions_exceeding_particles_are_empty() {
        let store = random_store(5, 1);
        let config = SimulationConfig {
            j_partitions: 16,
            ..Default::default()
        };
        let mut backend = CpuBackend::new(&config, store.len()).unwrap();
        backend.upload(&store).unwrap();
        backend.predict(0.0).unwrap();
        let mut out = vec![Forces::ZERO; 5];
        backend.compute_forces(&[0, 1, 2, 3, 4], &mut out).unwrap();
        for (i, f) in out.iter().enumerate() {
            assert_eq!(*f, naive(backend.predicted(), i, config.softening2));
        }
    }

    #[test]
    fn sync_rows_updates_mirror() {
        let mut store = random_store(10, 3);
        let config = SimulationConfig::default();
        let mut backend = CpuBackend::new(&config, store.len()).unwrap();
        backend.upload(&store).unwrap();

        let f = Forces {
            a: [1.0, 2.0, 3.0],
            a1: [0.0; 3],
        };
        store.set_initial_forces(4, &f, 0.125);
        let rows = store.take_dirty();
        backend.sync_rows(&store, &rows).unwrap();
        assert_eq!(backend.bodies(), &store.device_rows()[..]);
    }
}
