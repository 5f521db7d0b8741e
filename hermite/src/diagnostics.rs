//! Energy bookkeeping and structural diagnostics of the system.

use std::fmt::Display;

use cgmath::{EuclideanSpace, InnerSpace, MetricSpace, Point3, Vector3, Zero};
use kernels::{Predictor, pair_potential};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::{
    constants::{CORE_MASS_FRACTION, DENSITY_NEIGHBOURS},
    store::ParticleStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Energy {
    pub kinetic: f64,
    pub potential: f64,
}

impl Energy {
    pub fn total(&self) -> f64 {
        self.kinetic + self.potential
    }
}

impl Display for Energy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "E = {:.10e} (K = {:.6e}, U = {:.6e})",
            self.total(),
            self.kinetic,
            self.potential
        )
    }
}

/// Energy of a set of bodies that all refer to the same time.
///
/// Per-body terms are computed in parallel and summed in index order, so the
/// result does not depend on how rayon splits the work.
pub fn energy_of(bodies: &[Predictor], softening2: f64, g: f64) -> Energy {
    let terms: Vec<(f64, f64)> = bodies
        .par_iter()
        .enumerate()
        .map(|(i, bi)| {
            let kinetic = 0.5 * bi.m as f64 * kernels::dot(bi.v, bi.v);
            let potential = bodies[i + 1..]
                .iter()
                .map(|bj| pair_potential(bi, bj, softening2, g))
                .sum::<f64>();
            (kinetic, potential)
        })
        .collect();
    terms.iter().fold(Energy::default(), |e, &(k, u)| Energy {
        kinetic: e.kinetic + k,
        potential: e.potential + u,
    })
}

/// Stored rows, each at its own last correction time.
fn stored_bodies(store: &ParticleStore) -> Vec<Predictor> {
    store
        .positions()
        .iter()
        .zip(store.velocities())
        .zip(store.mass())
        .map(|((r, v), &m)| Predictor {
            r: (*r).into(),
            m,
            v: (*v).into(),
            ..Default::default()
        })
        .collect()
}

/// Energy of the stored rows, each at its own last correction time.
pub fn total_energy(store: &ParticleStore, softening2: f64, g: f64) -> Energy {
    energy_of(&stored_bodies(store), softening2, g)
}

/// `|E - E0| / |E0|`.
pub fn relative_drift(e0: f64, e: f64) -> f64 {
    (e - e0).abs() / e0.abs()
}

/// `G M^(5/2) / (2|E|)^(3/2)`.
pub fn crossing_time(total_mass: f64, energy: f64, g: f64) -> f64 {
    g * total_mass.powf(2.5) / (2.0 * energy.abs()).powf(1.5)
}

/// Spitzer's half-mass relaxation time `0.138 N / ln(0.4 N) sqrt(r_h^3 / (G M))`.
///
/// NaN for `N < 3`, where the Coulomb logarithm is not positive.
pub fn half_mass_relaxation_time(n: usize, total_mass: f64, r_half: f64, g: f64) -> f64 {
    if n < 3 {
        return f64::NAN;
    }
    let n = n as f64;
    0.138 * n / (0.4 * n).ln() * (r_half.powi(3) / (g * total_mass)).sqrt()
}

fn position(b: &Predictor) -> Point3<f64> {
    Point3::from(b.r)
}

fn mass_of(bodies: &[Predictor]) -> f64 {
    bodies.iter().map(|b| b.m as f64).sum()
}

/// Density-weighted centre (Casertano & Hut 1985). The local density of a
/// particle is the mass of its `neighbours - 1` nearest neighbours spread
/// over the sphere reaching the `neighbours`-th one.
pub fn center_of_density(bodies: &[Predictor], neighbours: usize) -> Point3<f64> {
    let n = bodies.len();
    if n == 1 {
        return position(&bodies[0]);
    }
    let k = neighbours.clamp(1, n - 1);

    let weights: Vec<(Vector3<f64>, f64)> = bodies
        .par_iter()
        .enumerate()
        .map(|(i, bi)| {
            let pi = position(bi);
            let mut near: Vec<(f64, f32)> = bodies
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, bj)| (pi.distance2(position(bj)), bj.m))
                .collect();
            near.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            let r_k = near[k - 1].0.sqrt();
            let inner: f64 = if k == 1 {
                near[0].1 as f64
            } else {
                near[..k - 1].iter().map(|&(_, m)| m as f64).sum()
            };
            let volume = 4.0 / 3.0 * std::f64::consts::PI * r_k.powi(3);
            let rho = inner / volume.max(f64::MIN_POSITIVE);
            (pi.to_vec() * rho, rho)
        })
        .collect();
    let (weighted, total) = weights
        .iter()
        .fold((Vector3::zero(), 0.0), |(wa, ta), &(w, rho)| (wa + w, ta + rho));

    if total > 0.0 {
        Point3::from_vec(weighted / total)
    } else {
        position(&bodies[0])
    }
}

/// Radius around `center` that encloses `fraction` of the total mass.
pub fn lagrange_radius(bodies: &[Predictor], center: Point3<f64>, fraction: f64) -> f64 {
    let mut shells: Vec<(f64, f64)> = bodies
        .iter()
        .map(|b| ((position(b) - center).magnitude(), b.m as f64))
        .collect();
    shells.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let target = fraction * mass_of(bodies);
    let mut enclosed = 0.0;
    for (r, m) in &shells {
        enclosed += m;
        if enclosed >= target {
            return *r;
        }
    }
    shells.last().map_or(0.0, |s| s.0)
}

/// Snapshot of the cluster structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureReport {
    pub center: Point3<f64>,
    pub core_radius: f64,
    pub half_mass_radius: f64,
    pub crossing_time: f64,
    /// NaN for fewer than three bodies.
    pub relaxation_time: f64,
}

impl StructureReport {
    /// Measure `bodies`, which must all refer to the same time as `energy`.
    pub fn measure(bodies: &[Predictor], energy: &Energy, g: f64) -> Self {
        let center = center_of_density(bodies, DENSITY_NEIGHBOURS);
        let half_mass_radius = lagrange_radius(bodies, center, 0.5);
        let total_mass = mass_of(bodies);
        Self {
            center,
            core_radius: lagrange_radius(bodies, center, CORE_MASS_FRACTION),
            half_mass_radius,
            crossing_time: crossing_time(total_mass, energy.total(), g),
            relaxation_time: half_mass_relaxation_time(
                bodies.len(),
                total_mass,
                half_mass_radius,
                g,
            ),
        }
    }
}

impl Display for StructureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "r_core = {:.4}, r_half = {:.4}, t_cr = {:.4}, t_rh = {:.4}",
            self.core_radius, self.half_mass_radius, self.crossing_time, self.relaxation_time
        )
    }
}
