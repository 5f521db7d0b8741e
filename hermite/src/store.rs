//! Canonical host-side particle arrays.
//!
//! The store is structure-of-arrays: one `Vec` per quantity, indexed by
//! particle. Rows touched by the corrector are recorded as dirty so the force
//! backend only needs to re-upload those.

use cgmath::{Point3, Vector3, Zero};
use kernels::{Body, Forces};

use crate::error::HermiteError;

/// One particle of the initial conditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleInit {
    pub mass: f32,
    pub pos: Point3<f64>,
    pub vel: Vector3<f64>,
}

impl ParticleInit {
    pub fn new(mass: f32, pos: impl Into<Point3<f64>>, vel: impl Into<Vector3<f64>>) -> Self {
        Self {
            mass,
            pos: pos.into(),
            vel: vel.into(),
        }
    }
}

/// Read-only snapshot of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub mass: f32,
    pub pos: Point3<f64>,
    pub vel: Vector3<f64>,
    pub time: f64,
    pub step: f64,
    pub acc: Vector3<f64>,
    pub jerk: Vector3<f64>,
    /// Second and third acceleration derivatives from the last correction.
    pub acc2: Vector3<f64>,
    pub acc3: Vector3<f64>,
}

/// Result of correcting one particle, written back in one go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedState {
    pub t: f64,
    pub r: Point3<f64>,
    pub v: Vector3<f64>,
    pub a: Vector3<f64>,
    pub j: Vector3<f64>,
    pub a2: Vector3<f64>,
    pub a3: Vector3<f64>,
    pub dt: f64,
}

#[derive(Debug, Clone)]
pub struct ParticleStore {
    mass: Vec<f32>,
    pos: Vec<Point3<f64>>,
    vel: Vec<Vector3<f64>>,
    time: Vec<f64>,
    step: Vec<f64>,
    acc: Vec<Vector3<f64>>,
    jerk: Vec<Vector3<f64>>,
    acc2: Vec<Vector3<f64>>,
    acc3: Vec<Vector3<f64>>,
    old_acc: Vec<Vector3<f64>>,
    old_jerk: Vec<Vector3<f64>>,
    dirty: Vec<usize>,
    dirty_mask: Vec<bool>,
}

fn finite(v: Vector3<f64>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

impl ParticleStore {
    /// Validate the initial conditions and build the store. Every particle
    /// starts at `t = 0` with zero forces and no step.
    pub fn load(initial: &[ParticleInit]) -> Result<Self, HermiteError> {
        if initial.is_empty() {
            return Err(HermiteError::EmptySystem);
        }
        if initial.len() > u32::MAX as usize {
            return Err(HermiteError::InvalidConfig(format!(
                "{} particles exceed the u32 index range",
                initial.len()
            )));
        }
        for (index, p) in initial.iter().enumerate() {
            let reason = if !(p.mass.is_finite() && p.mass > 0.0) {
                Some("mass must be finite and positive")
            } else if !finite(p.pos - Point3::new(0.0, 0.0, 0.0)) {
                Some("position must be finite")
            } else if !finite(p.vel) {
                Some("velocity must be finite")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(HermiteError::InvalidParticle { index, reason });
            }
        }

        let n = initial.len();
        let zeros = vec![Vector3::zero(); n];
        Ok(Self {
            mass: initial.iter().map(|p| p.mass).collect(),
            pos: initial.iter().map(|p| p.pos).collect(),
            vel: initial.iter().map(|p| p.vel).collect(),
            time: vec![0.0; n],
            step: vec![0.0; n],
            acc: zeros.clone(),
            jerk: zeros.clone(),
            acc2: zeros.clone(),
            acc3: zeros.clone(),
            old_acc: zeros.clone(),
            old_jerk: zeros,
            dirty: Vec::new(),
            dirty_mask: vec![false; n],
        })
    }

    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn get(&self, i: usize) -> Particle {
        Particle {
            mass: self.mass[i],
            pos: self.pos[i],
            vel: self.vel[i],
            time: self.time[i],
            step: self.step[i],
            acc: self.acc[i],
            jerk: self.jerk[i],
            acc2: self.acc2[i],
            acc3: self.acc3[i],
        }
    }

    /// Forces the particle carried into its current step.
    pub fn forces(&self, i: usize) -> Forces {
        Forces {
            a: self.acc[i].into(),
            a1: self.jerk[i].into(),
        }
    }

    /// Forces before the last correction.
    pub fn previous_forces(&self, i: usize) -> Forces {
        Forces {
            a: self.old_acc[i].into(),
            a1: self.old_jerk[i].into(),
        }
    }

    /// Start-up forces and step, before the first tick.
    pub fn set_initial_forces(&mut self, i: usize, forces: &Forces, dt: f64) {
        self.acc[i] = forces.a.into();
        self.jerk[i] = forces.a1.into();
        self.old_acc[i] = self.acc[i];
        self.old_jerk[i] = self.jerk[i];
        self.step[i] = dt;
        self.mark_dirty(i);
    }

    pub fn apply_correction(&mut self, i: usize, state: &CorrectedState) {
        self.old_acc[i] = self.acc[i];
        self.old_jerk[i] = self.jerk[i];
        self.time[i] = state.t;
        self.pos[i] = state.r;
        self.vel[i] = state.v;
        self.acc[i] = state.a;
        self.jerk[i] = state.j;
        self.acc2[i] = state.a2;
        self.acc3[i] = state.a3;
        self.step[i] = state.dt;
        self.mark_dirty(i);
    }

    fn mark_dirty(&mut self, i: usize) {
        if !self.dirty_mask[i] {
            self.dirty_mask[i] = true;
            self.dirty.push(i);
        }
    }

    /// Drain the rows changed since the last call, ascending.
    pub fn take_dirty(&mut self) -> Vec<usize> {
        let mut rows = std::mem::take(&mut self.dirty);
        for &i in &rows {
            self.dirty_mask[i] = false;
        }
        rows.sort_unstable();
        rows
    }

    pub fn device_row(&self, i: usize) -> Body {
        Body {
            r: self.pos[i].into(),
            t: self.time[i],
            v: self.vel[i].into(),
            m: self.mass[i],
            a: self.acc[i].into(),
            j: self.jerk[i].into(),
            ..Default::default()
        }
    }

    pub fn device_rows(&self) -> Vec<Body> {
        (0..self.len()).map(|i| self.device_row(i)).collect()
    }

    /// `min_i(t_i + dt_i)`, the time of the next block.
    pub fn next_block_time(&self) -> f64 {
        self.time
            .iter()
            .zip(&self.step)
            .map(|(t, dt)| t + dt)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn total_mass(&self) -> f64 {
        self.mass.iter().map(|&m| m as f64).sum()
    }

    pub fn mass(&self) -> &[f32] {
        &self.mass
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.pos
    }

    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.vel
    }

    pub fn times(&self) -> &[f64] {
        &self.time
    }

    pub fn steps(&self) -> &[f64] {
        &self.step
    }

    pub fn accelerations(&self) -> &[Vector3<f64>] {
        &self.acc
    }

    pub fn jerks(&self) -> &[Vector3<f64>] {
        &self.jerk
    }
}
