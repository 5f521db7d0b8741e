//! Numerical kernels shared by the host integrator and the rust-gpu shaders.
//!
//! Everything in here must compile for `spirv-unknown-*`, so there is no
//! allocation, no iterators over slices and no `std` float intrinsics. Vectors
//! are plain `[f64; 3]`, the records are `repr(C)` with explicit padding so the
//! host can upload them with `bytemuck` and the shaders see the same layout.
#![cfg_attr(target_arch = "spirv", no_std)]
#![allow(clippy::too_many_arguments)]

#[cfg(target_arch = "spirv")]
use spirv_std::num_traits::Float;

pub type Vec3 = [f64; 3];

/// Invocations per workgroup for the per-particle kernels (predict, reduce).
pub const PARTICLE_THREADS: u32 = 64;

/// Tile widths the force kernel is compiled for.
pub const FORCE_BLOCK_SIZES: [u32; 4] = [32, 64, 128, 256];

/// Canonical particle row as mirrored on the device.
#[repr(C)]
#[derive(Clone, Copy, Default)]
#[cfg_attr(
    not(target_arch = "spirv"),
    derive(Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)
)]
pub struct Body {
    pub r: Vec3,
    /// Time of the last correction.
    pub t: f64,
    pub v: Vec3,
    pub m: f32,
    pub _pad0: f32,
    pub a: Vec3,
    pub _pad1: f64,
    pub j: Vec3,
    pub _pad2: f64,
}

/// Predicted state of one particle at the current block time.
#[repr(C)]
#[derive(Clone, Copy, Default)]
#[cfg_attr(
    not(target_arch = "spirv"),
    derive(Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)
)]
pub struct Predictor {
    pub r: Vec3,
    pub m: f32,
    pub _pad0: f32,
    pub v: Vec3,
    pub _pad1: f64,
}

/// Acceleration and its first time derivative (jerk).
#[repr(C)]
#[derive(Clone, Copy, Default)]
#[cfg_attr(
    not(target_arch = "spirv"),
    derive(Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)
)]
pub struct Forces {
    pub a: Vec3,
    pub a1: Vec3,
}

impl Forces {
    pub const ZERO: Forces = Forces {
        a: [0.0; 3],
        a1: [0.0; 3],
    };

    #[inline]
    pub fn add(self, other: Forces) -> Forces {
        Forces {
            a: add(self.a, other.a),
            a1: add(self.a1, other.a1),
        }
    }

    #[inline]
    pub fn accumulate(&mut self, other: &Forces) {
        self.a = add(self.a, other.a);
        self.a1 = add(self.a1, other.a1);
    }
}

/// Push constants shared by every compute entry point.
#[repr(C)]
#[derive(Clone, Copy, Default)]
#[cfg_attr(
    not(target_arch = "spirv"),
    derive(Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)
)]
pub struct KernelConstants {
    /// Number of mirrored particles (j-sources).
    pub n: u32,
    /// Number of entries in the active index list (i-particles).
    pub n_active: u32,
    pub j_partitions: u32,
    pub _pad: u32,
    pub t_global: f64,
    pub softening2: f64,
    pub g: f64,
}

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// Taylor-extrapolate `body` from its own time to `t`.
#[inline]
pub fn predict(body: &Body, t: f64) -> Predictor {
    let dt = t - body.t;
    let dt2 = dt * dt * 0.5;
    let dt3 = dt * dt * dt * (1.0 / 6.0);

    Predictor {
        r: [
            body.r[0] + body.v[0] * dt + body.a[0] * dt2 + body.j[0] * dt3,
            body.r[1] + body.v[1] * dt + body.a[1] * dt2 + body.j[1] * dt3,
            body.r[2] + body.v[2] * dt + body.a[2] * dt2 + body.j[2] * dt3,
        ],
        m: body.m,
        _pad0: 0.0,
        v: [
            body.v[0] + body.a[0] * dt + body.j[0] * dt2,
            body.v[1] + body.a[1] * dt + body.j[1] * dt2,
            body.v[2] + body.a[2] * dt + body.j[2] * dt2,
        ],
        _pad1: 0.0,
    }
}

/// Add the softened pull of `pj` on `pi` to `acc`. The caller skips `i == j`.
#[inline]
pub fn interact(pi: &Predictor, pj: &Predictor, softening2: f64, g: f64, acc: &mut Forces) {
    let rx = pj.r[0] - pi.r[0];
    let ry = pj.r[1] - pi.r[1];
    let rz = pj.r[2] - pi.r[2];
    let vx = pj.v[0] - pi.v[0];
    let vy = pj.v[1] - pi.v[1];
    let vz = pj.v[2] - pi.v[2];

    let r2 = rx * rx + ry * ry + rz * rz + softening2;
    let rv = rx * vx + ry * vy + rz * vz;
    let inv_r2 = 1.0 / r2;
    let inv_r = inv_r2.sqrt();
    let mf = g * pj.m as f64 * inv_r * inv_r2;
    let alpha = 3.0 * rv * inv_r2;

    acc.a[0] += mf * rx;
    acc.a[1] += mf * ry;
    acc.a[2] += mf * rz;

    acc.a1[0] += mf * (vx - alpha * rx);
    acc.a1[1] += mf * (vy - alpha * ry);
    acc.a1[2] += mf * (vz - alpha * rz);
}

/// Softened pair potential energy `-G m_i m_j / sqrt(r^2 + e2)`.
#[inline]
pub fn pair_potential(pi: &Predictor, pj: &Predictor, softening2: f64, g: f64) -> f64 {
    let r = sub(pj.r, pi.r);
    -g * pi.m as f64 * pj.m as f64 / (dot(r, r) + softening2).sqrt()
}

/// Half-open j-range `[start, end)` covered by `partition` out of `partitions`.
///
/// Partitions are contiguous and of equal width `ceil(n / partitions)`; the
/// trailing ones may be short or empty.
#[inline]
pub fn partition_range(partition: u32, partitions: u32, n: u32) -> (u32, u32) {
    let width = (n + partitions - 1) / partitions;
    let start = (partition * width).min(n);
    let end = (start + width).min(n);
    (start, end)
}

/// Corrected state and the derivatives recovered from the Hermite interpolant,
/// both evaluated at the end of the step.
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq))]
pub struct Correction {
    pub r: Vec3,
    pub v: Vec3,
    pub a2: Vec3,
    pub a3: Vec3,
}

/// 4th-order Hermite corrector (Makino & Aarseth 1992).
///
/// `old` holds acceleration and jerk at the start of the step, `new` the ones
/// evaluated on the predicted state at the end of it.
#[inline]
pub fn correct(pred: &Predictor, old: &Forces, new: &Forces, dt: f64) -> Correction {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;
    let dt5 = dt4 * dt;
    let inv_dt2 = 1.0 / dt2;
    let inv_dt3 = inv_dt2 / dt;

    let mut out = Correction::default();
    let mut k = 0;
    while k < 3 {
        let da = old.a[k] - new.a[k];
        let a2 = (-6.0 * da - dt * (4.0 * old.a1[k] + 2.0 * new.a1[k])) * inv_dt2;
        let a3 = (12.0 * da + 6.0 * dt * (old.a1[k] + new.a1[k])) * inv_dt3;

        out.r[k] = pred.r[k] + a2 * dt4 / 24.0 + a3 * dt5 / 120.0;
        out.v[k] = pred.v[k] + a2 * dt3 / 6.0 + a3 * dt4 / 24.0;
        out.a2[k] = a2 + dt * a3;
        out.a3[k] = a3;
        k += 1;
    }
    out
}

/// Aarseth's step criterion
/// `sqrt(eta (|a||a2| + |a1|^2) / (|a1||a3| + |a2|^2))`.
///
/// Returns `+inf` when the denominator vanishes (no derivative constrains the
/// step), which callers clamp to their maximum step.
#[inline]
pub fn aarseth_step(a: Vec3, a1: Vec3, a2: Vec3, a3: Vec3, eta: f64) -> f64 {
    let a = norm(a);
    let a1 = norm(a1);
    let a2 = norm(a2);
    let a3 = norm(a3);

    let den = a1 * a3 + a2 * a2;
    if den == 0.0 {
        return f64::INFINITY;
    }
    (eta * (a * a2 + a1 * a1) / den).sqrt()
}

/// Start-up step `eta_s |a| / |a1|`, `+inf` when the jerk vanishes.
#[inline]
pub fn initial_step(forces: &Forces, eta_s: f64) -> f64 {
    let a1 = norm(forces.a1);
    if a1 == 0.0 {
        return f64::INFINITY;
    }
    eta_s * norm(forces.a) / a1
}

#[cfg(all(test, not(target_arch = "spirv")))]
mod tests {
    use super::*;

    fn body(r: Vec3, v: Vec3, a: Vec3, j: Vec3, t: f64) -> Body {
        Body {
            r,
            t,
            v,
            m: 1.0,
            a,
            j,
            ..Default::default()
        }
    }

    fn particle(r: Vec3, v: Vec3, m: f32) -> Predictor {
        Predictor {
            r,
            m,
            v,
            ..Default::default()
        }
    }

    #[test]
    fn record_sizes_match_device_layout() {
        assert_eq!(std::mem::size_of::<Body>(), 128);
        assert_eq!(std::mem::size_of::<Predictor>(), 64);
        assert_eq!(std::mem::size_of::<Forces>(), 48);
        assert_eq!(std::mem::size_of::<KernelConstants>(), 40);
    }

    #[test]
    fn predict_is_exact_for_cubic_motion() {
        let b = body(
            [1.0, 2.0, 3.0],
            [0.5, 0.0, -1.0],
            [2.0, 0.0, 0.0],
            [0.0, 6.0, 0.0],
            1.0,
        );
        let p = predict(&b, 3.0);
        // dt = 2: r = r0 + v dt + a dt^2/2 + j dt^3/6
        let expected = [6.0, 10.0, 1.0];
        for k in 0..3 {
            assert!((p.r[k] - expected[k]).abs() < 1e-14);
        }
        assert_eq!(p.v, [4.5, 12.0, -1.0]);
        assert_eq!(p.m, 1.0);
    }

    #[test]
    fn predict_at_own_time_is_identity() {
        let b = body([1.0, -2.0, 0.25], [3.0, 4.0, 5.0], [1.0; 3], [1.0; 3], 0.5);
        let p = predict(&b, 0.5);
        assert_eq!(p.r, b.r);
        assert_eq!(p.v, b.v);
    }

    #[test]
    fn forces_add_and_accumulate_agree() {
        let x = Forces {
            a: [1.0, 2.0, 3.0],
            a1: [4.0, 5.0, 6.0],
        };
        let y = Forces {
            a: [0.5, 0.5, 0.5],
            a1: [-1.0, -1.0, -1.0],
        };
        let mut z = x;
        z.accumulate(&y);
        assert_eq!(z, x.add(y));
        assert_eq!(z.a, [1.5, 2.5, 3.5]);
        assert_eq!(z.a1, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn interaction_points_towards_source() {
        let pi = particle([0.0; 3], [0.0; 3], 1.0);
        let pj = particle([2.0, 0.0, 0.0], [0.0; 3], 4.0);
        let mut f = Forces::ZERO;
        interact(&pi, &pj, 0.0, 1.0, &mut f);
        // G m / r^2 = 4 / 4
        assert!((f.a[0] - 1.0).abs() < 1e-15);
        assert_eq!(f.a[1], 0.0);
        assert_eq!(f.a1, [0.0; 3]);
    }

    #[test]
    fn jerk_matches_finite_difference() {
        let pi = particle([0.1, -0.2, 0.3], [0.0, 0.1, 0.0], 1.0);
        let pj = particle([1.0, 0.5, -0.4], [-0.3, 0.2, 0.7], 0.8);
        let h = 1e-6;

        let mut f0 = Forces::ZERO;
        interact(&pi, &pj, 1e-4, 1.0, &mut f0);

        let step = |p: &Predictor, s: f64| Predictor {
            r: add(p.r, scale(p.v, s)),
            ..*p
        };
        let mut fp = Forces::ZERO;
        let mut fm = Forces::ZERO;
        interact(&step(&pi, h), &step(&pj, h), 1e-4, 1.0, &mut fp);
        interact(&step(&pi, -h), &step(&pj, -h), 1e-4, 1.0, &mut fm);

        for k in 0..3 {
            let fd = (fp.a[k] - fm.a[k]) / (2.0 * h);
            assert!(
                (fd - f0.a1[k]).abs() < 1e-6,
                "component {k}: {fd} vs {}",
                f0.a1[k]
            );
        }
    }

    #[test]
    fn coincident_particles_stay_finite() {
        let pi = particle([1.0, 1.0, 1.0], [0.0; 3], 1.0);
        let pj = particle([1.0, 1.0, 1.0], [1.0, 0.0, 0.0], 1.0);
        let mut f = Forces::ZERO;
        interact(&pi, &pj, 1e-8, 1.0, &mut f);
        assert!(f.a.iter().chain(f.a1.iter()).all(|x| x.is_finite()));
        assert!(pair_potential(&pi, &pj, 1e-8, 1.0).is_finite());
    }

    #[test]
    fn partitions_cover_range_exactly_once() {
        for n in [1u32, 7, 16, 100, 1023] {
            for parts in [1u32, 3, 16, 200] {
                let mut next = 0;
                for p in 0..parts {
                    let (start, end) = partition_range(p, parts, n);
                    assert!(start <= end);
                    if start < end {
                        assert_eq!(start, next);
                        next = end;
                    }
                }
                assert_eq!(next, n, "n = {n}, parts = {parts}");
            }
        }
    }

    #[test]
    fn corrector_reproduces_quartic_acceleration() {
        // a(t) = c0 + c1 t + c2 t^2 / 2 + c3 t^3 / 6 along x: the interpolant
        // recovers c2 and c3 exactly from the endpoint values.
        let (c0, c1, c2, c3) = (0.3, -0.7, 1.1, 2.5);
        let dt = 0.25;
        let acc = |t: f64| c0 + c1 * t + c2 * t * t / 2.0 + c3 * t * t * t / 6.0;
        let jerk = |t: f64| c1 + c2 * t + c3 * t * t / 2.0;

        let old = Forces {
            a: [acc(0.0), 0.0, 0.0],
            a1: [jerk(0.0), 0.0, 0.0],
        };
        let new = Forces {
            a: [acc(dt), 0.0, 0.0],
            a1: [jerk(dt), 0.0, 0.0],
        };
        let b = body([0.0; 3], [0.0; 3], old.a, old.a1, 0.0);
        let c = correct(&predict(&b, dt), &old, &new, dt);

        let exact_r = c0 * dt * dt / 2.0
            + c1 * dt.powi(3) / 6.0
            + c2 * dt.powi(4) / 24.0
            + c3 * dt.powi(5) / 120.0;
        assert!((c.r[0] - exact_r).abs() < 1e-14);
        assert!((c.a2[0] - (c2 + c3 * dt)).abs() < 1e-10);
        assert!((c.a3[0] - c3).abs() < 1e-9);
    }

    #[test]
    fn step_criterion_for_circular_orbit() {
        // Unit circular orbit: |a^(k)| = 1 for every order, so dt = sqrt(eta).
        let a = [-1.0, 0.0, 0.0];
        let a1 = [0.0, -1.0, 0.0];
        let a2 = [1.0, 0.0, 0.0];
        let a3 = [0.0, 1.0, 0.0];
        let dt = aarseth_step(a, a1, a2, a3, 0.01);
        assert!((dt - 0.1).abs() < 1e-15);
    }

    #[test]
    fn unconstrained_steps_are_infinite() {
        let zero = [0.0; 3];
        assert_eq!(aarseth_step(zero, zero, zero, zero, 0.01), f64::INFINITY);
        assert_eq!(initial_step(&Forces::ZERO, 0.01), f64::INFINITY);
    }
}
