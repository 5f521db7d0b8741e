//! Block time-step quantisation.
//!
//! Steps are powers of two in `[dt_min, dt_max]` and a particle's time is
//! always a multiple of its step, so particles sharing a step stay in lockstep.

use kernels::{Forces, Vec3, aarseth_step, initial_step};

use crate::config::SimulationConfig;

const MANTISSA_MASK: u64 = 0xFFF0_0000_0000_0000;

/// Largest power of two not above `x`, for positive normal `x`.
#[inline]
pub fn floor_pow2(x: f64) -> f64 {
    f64::from_bits(x.to_bits() & MANTISSA_MASK)
}

#[inline]
pub fn is_power_of_two(x: f64) -> bool {
    x > 0.0 && x.is_normal() && x.to_bits() & !MANTISSA_MASK == 0
}

fn clamp_pow2(raw: f64, config: &SimulationConfig) -> f64 {
    // NaN or +inf means nothing constrains the step.
    if !raw.is_finite() {
        return config.dt_max;
    }
    floor_pow2(raw.clamp(config.dt_min, config.dt_max))
}

/// Start-up step from `eta_s |a| / |j|`.
pub fn initial(forces: &Forces, config: &SimulationConfig) -> f64 {
    clamp_pow2(initial_step(forces, config.eta_s), config)
}

/// Step for the next block of a particle corrected to `t_new`.
///
/// Shrinks freely to the power of two below the estimate. Grows by at most a
/// factor two, and only when `t_new` is aligned to the doubled step.
pub fn next_step(
    dt: f64,
    t_new: f64,
    derivatives: [Vec3; 4],
    config: &SimulationConfig,
) -> f64 {
    let [a, a1, a2, a3] = derivatives;
    let raw = aarseth_step(a, a1, a2, a3, config.eta_n);

    let next = if raw < dt {
        floor_pow2(raw.max(config.dt_min))
    } else if raw >= 2.0 * dt && t_new % (2.0 * dt) == 0.0 {
        2.0 * dt
    } else {
        dt
    };
    next.clamp(config.dt_min, config.dt_max)
}
