use std::fmt::Display;

use cgmath::{Point3, Vector3};
use kernels::{Forces, Predictor, predict};
use log::{debug, info, trace};

use crate::{
    backend::ForceBackend,
    config::SimulationConfig,
    corrector::correct_active,
    diagnostics::{Energy, StructureReport, energy_of, relative_drift, total_energy},
    error::HermiteError,
    exchange::Snapshot,
    scheduler::BlockScheduler,
    store::{CorrectedState, ParticleInit, ParticleStore},
    timestep,
};

/// Outcome of one block tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// 1-based number of the tick just completed.
    pub tick: u64,
    /// Global time after the tick.
    pub t_global: f64,
    /// Number of particles integrated in this tick.
    pub active: usize,
    /// Energy, on ticks that are a multiple of the sampling interval.
    pub energy: Option<Energy>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub t_global: f64,
    pub initial_energy: Energy,
    pub final_energy: Energy,
    /// Particle updates over the whole run.
    pub updates: u64,
}

impl RunSummary {
    pub fn drift(&self) -> f64 {
        relative_drift(self.initial_energy.total(), self.final_energy.total())
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ticks to t = {:.6} ({} particle steps), dE/E0 = {:.3e}",
            self.ticks,
            self.t_global,
            self.updates,
            self.drift()
        )
    }
}

/// Owns everything a run needs: the particle store, the force backend and
/// the block scheduler.
pub struct Simulation<B> {
    config: SimulationConfig,
    store: ParticleStore,
    backend: B,
    scheduler: BlockScheduler,
    initial_energy: Energy,
    updates: u64,
    forces: Vec<Forces>,
    corrected: Vec<CorrectedState>,
}

impl<B: ForceBackend> Simulation<B> {
    /// Load the particles, evaluate the start-up forces and assign every
    /// particle its initial block step.
    pub fn new(
        config: SimulationConfig,
        initial: &[ParticleInit],
        mut backend: B,
    ) -> Result<Self, HermiteError> {
        config.validate()?;
        let mut store = ParticleStore::load(initial)?;
        let n = store.len();

        backend.upload(&store)?;
        backend.predict(0.0)?;
        let all: Vec<u32> = (0..n as u32).collect();
        let mut forces = vec![Forces::ZERO; n];
        backend.compute_forces(&all, &mut forces)?;

        for (index, f) in forces.iter().enumerate() {
            if !f.a.iter().chain(&f.a1).all(|x| x.is_finite()) {
                return Err(HermiteError::NumericalDegeneracy {
                    tick: 0,
                    index,
                    quantity: "initial forces",
                });
            }
            store.set_initial_forces(index, f, timestep::initial(f, &config));
        }
        let rows = store.take_dirty();
        backend.sync_rows(&store, &rows)?;

        let initial_energy = total_energy(&store, config.softening2, config.g);
        info!(
            "{} particles on the {} backend, {initial_energy}",
            n,
            backend.name()
        );

        Ok(Self {
            config,
            store,
            backend,
            scheduler: BlockScheduler::new(),
            initial_energy,
            updates: 0,
            forces,
            corrected: Vec::with_capacity(n),
        })
    }

    /// Integrate the next block of particles.
    pub fn step(&mut self) -> Result<TickReport, HermiteError> {
        let t_next = self.scheduler.select(&self.store);
        let tick = self.scheduler.tick() + 1;
        let active = self.scheduler.active();

        self.backend.predict(t_next)?;
        self.forces.resize(active.len(), Forces::ZERO);
        self.backend.compute_forces(active, &mut self.forces)?;
        correct_active(
            &self.store,
            active,
            &self.forces,
            t_next,
            tick,
            &self.config,
            &mut self.corrected,
        )?;
        for (&i, state) in active.iter().zip(&self.corrected) {
            self.store.apply_correction(i as usize, state);
        }
        let rows = self.store.take_dirty();
        self.backend.sync_rows(&self.store, &rows)?;

        let n_active = active.len();
        self.scheduler.advance();
        self.updates += n_active as u64;
        trace!("tick {tick}: t = {t_next}, {n_active} active");

        let energy = if self.config.energy_interval > 0 && tick % self.config.energy_interval == 0
        {
            let energy = self.energy();
            debug!(
                "tick {tick} t = {t_next:.6}: {energy}, dE/E0 = {:.3e}",
                relative_drift(self.initial_energy.total(), energy.total())
            );
            Some(energy)
        } else {
            None
        };

        Ok(TickReport {
            tick,
            t_global: t_next,
            active: n_active,
            energy,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.t_global() >= self.config.itime
            || self.scheduler.tick() >= self.config.iterations
    }

    /// Step until `itime` or the iteration cap is reached.
    pub fn run(&mut self) -> Result<RunSummary, HermiteError> {
        while !self.is_finished() {
            self.step()?;
        }
        let summary = self.summary();
        info!("{summary}");
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.scheduler.tick(),
            t_global: self.scheduler.t_global(),
            initial_energy: self.initial_energy,
            final_energy: self.energy(),
            updates: self.updates,
        }
    }

    /// Every particle predicted to the global time.
    pub fn synchronized(&self) -> Vec<Predictor> {
        let t = self.scheduler.t_global();
        (0..self.store.len())
            .map(|i| predict(&self.store.device_row(i), t))
            .collect()
    }

    /// Energy of the system predicted to the global time.
    pub fn energy(&self) -> Energy {
        energy_of(
            &self.synchronized(),
            self.config.softening2,
            self.config.g,
        )
    }

    pub fn snapshot(&self) -> Snapshot {
        let bodies = self.synchronized();
        Snapshot {
            tick: self.scheduler.tick(),
            t_global: self.scheduler.t_global(),
            energy: energy_of(&bodies, self.config.softening2, self.config.g),
            positions: bodies.iter().map(|b| Point3::from(b.r)).collect(),
            velocities: bodies.iter().map(|b| Vector3::from(b.v)).collect(),
        }
    }

    /// Structure of the system predicted to the global time.
    pub fn structure(&self) -> StructureReport {
        let bodies = self.synchronized();
        let energy = energy_of(&bodies, self.config.softening2, self.config.g);
        StructureReport::measure(&bodies, &energy, self.config.g)
    }

    /// Indices integrated by the last tick, ascending.
    pub fn last_active(&self) -> &[u32] {
        self.scheduler.active()
    }

    pub fn t_global(&self) -> f64 {
        self.scheduler.t_global()
    }

    pub fn tick(&self) -> u64 {
        self.scheduler.tick()
    }

    pub fn initial_energy(&self) -> Energy {
        self.initial_energy
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
