//! Initial conditions in N-body units (G = M = 1).

use std::f64::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3, Zero};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::store::ParticleInit;

/// Equal-mass binary on a circular orbit of unit separation, period 2π.
pub fn two_body_circular() -> Vec<ParticleInit> {
    vec![
        ParticleInit::new(0.5, [-0.5, 0.0, 0.0], [0.0, -0.5, 0.0]),
        ParticleInit::new(0.5, [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]),
    ]
}

fn random_direction(rng: &mut StdRng) -> Vector3<f64> {
    let z: f64 = rng.random_range(-1.0..1.0);
    let phi: f64 = rng.random_range(0.0..2.0 * PI);
    let s = (1.0 - z * z).sqrt();
    Vector3::new(s * phi.cos(), s * phi.sin(), z)
}

fn uniform_sphere(rng: &mut StdRng) -> Point3<f64> {
    let r = rng.random::<f64>().cbrt();
    Point3::from_vec(random_direction(rng) * r)
}

/// Shift to the centre-of-mass frame.
fn center(particles: &mut [ParticleInit]) {
    let mut mass = 0.0;
    let mut pos = Vector3::zero();
    let mut vel = Vector3::zero();
    for p in particles.iter() {
        let m = p.mass as f64;
        mass += m;
        pos += p.pos.to_vec() * m;
        vel += p.vel * m;
    }
    let (pos, vel) = (pos / mass, vel / mass);
    for p in particles.iter_mut() {
        p.pos -= pos;
        p.vel -= vel;
    }
}

fn kinetic(particles: &[ParticleInit]) -> f64 {
    particles
        .iter()
        .map(|p| 0.5 * p.mass as f64 * p.vel.magnitude2())
        .sum()
}

fn potential(particles: &[ParticleInit]) -> f64 {
    let mut u = 0.0;
    for (i, pi) in particles.iter().enumerate() {
        for pj in &particles[i + 1..] {
            u -= pi.mass as f64 * pj.mass as f64 / (pj.pos - pi.pos).magnitude();
        }
    }
    u
}

/// `n` equal-mass particles uniform in the unit sphere with random velocities
/// scaled to virial equilibrium (2K = |U|).
pub fn random_cluster(n: usize, seed: u64) -> Vec<ParticleInit> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mass = 1.0 / n as f32;
    let mut particles: Vec<_> = (0..n)
        .map(|_| ParticleInit {
            mass,
            pos: uniform_sphere(&mut rng),
            vel: random_direction(&mut rng) * rng.random::<f64>(),
        })
        .collect();
    center(&mut particles);

    let k = kinetic(&particles);
    if n > 1 && k > 0.0 {
        let scale = (-potential(&particles) / (2.0 * k)).sqrt();
        for p in particles.iter_mut() {
            p.vel *= scale;
        }
    }
    particles
}

/// `n` equal-mass particles at rest, uniform in the unit sphere.
pub fn cold_cluster(n: usize, seed: u64) -> Vec<ParticleInit> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mass = 1.0 / n as f32;
    let mut particles: Vec<_> = (0..n)
        .map(|_| ParticleInit {
            mass,
            pos: uniform_sphere(&mut rng),
            vel: Vector3::zero(),
        })
        .collect();
    center(&mut particles);
    particles
}

/// Plummer sphere (Aarseth, Hénon & Wielen 1974) in standard units.
pub fn plummer(n: usize, seed: u64) -> Vec<ParticleInit> {
    // Plummer scale length for E = -1/4.
    const SCALE: f64 = 3.0 * PI / 16.0;
    const CUTOFF: f64 = 10.0;

    let mut rng = StdRng::seed_from_u64(seed);
    let mass = 1.0 / n as f32;
    let mut particles = Vec::with_capacity(n);
    while particles.len() < n {
        let x: f64 = rng.random_range(f64::EPSILON..1.0);
        let r = 1.0 / (x.powf(-2.0 / 3.0) - 1.0).sqrt();
        if r > CUTOFF {
            continue;
        }

        // von Neumann rejection on g(q) = q^2 (1 - q^2)^3.5
        let q = loop {
            let q: f64 = rng.random();
            let y: f64 = rng.random_range(0.0..0.1);
            if y < q * q * (1.0 - q * q).powf(3.5) {
                break q;
            }
        };
        let v = q * 2f64.sqrt() * (1.0 + r * r).powf(-0.25);

        particles.push(ParticleInit {
            mass,
            pos: Point3::from_vec(random_direction(&mut rng) * (r * SCALE)),
            vel: random_direction(&mut rng) * (v / SCALE.sqrt()),
        });
    }
    center(&mut particles);
    particles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_mass(p: &[ParticleInit]) -> f64 {
        p.iter().map(|p| p.mass as f64).sum()
    }

    fn momentum(p: &[ParticleInit]) -> Vector3<f64> {
        p.iter()
            .fold(Vector3::zero(), |acc, p| acc + p.vel * p.mass as f64)
    }

    #[test]
    fn binary_is_bound_and_circular() {
        let p = two_body_circular();
        // v^2 = G M / r for the relative orbit
        let rel_v = (p[1].vel - p[0].vel).magnitude();
        let rel_r = (p[1].pos - p[0].pos).magnitude();
        assert_eq!(rel_v * rel_v, total_mass(&p) / rel_r);
    }

    #[test]
    fn clusters_are_centred() {
        for p in [
            random_cluster(100, 1),
            cold_cluster(100, 2),
            plummer(100, 3),
        ] {
            assert_eq!(p.len(), 100);
            assert!((total_mass(&p) - 1.0).abs() < 1e-5);
            assert!(momentum(&p).magnitude() < 1e-12);
        }
    }

    #[test]
    fn random_cluster_is_virialised() {
        let p = random_cluster(200, 4);
        let ratio = 2.0 * kinetic(&p) / -potential(&p);
        assert!((ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn presets_are_reproducible() {
        assert_eq!(plummer(50, 9), plummer(50, 9));
        assert_ne!(random_cluster(50, 9), random_cluster(50, 10));
    }

    #[test]
    fn plummer_is_roughly_in_equilibrium() {
        let p = plummer(2000, 5);
        let ratio = 2.0 * kinetic(&p) / -potential(&p);
        assert!((0.8..1.2).contains(&ratio), "virial ratio {ratio}");
    }
}
