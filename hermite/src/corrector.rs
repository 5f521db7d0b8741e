//! Hermite correction of the active particles and their next step.

use cgmath::{Point3, Vector3};
use kernels::{Forces, Predictor, Vec3, correct, predict};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::{
    config::SimulationConfig,
    error::HermiteError,
    store::{CorrectedState, ParticleStore},
    timestep,
};

fn all_finite(v: &Vec3) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Correct particle `i` from its predicted state and the forces evaluated at
/// `t_global`. On failure, returns the name of the first non-finite quantity.
pub fn correct_particle(
    store: &ParticleStore,
    i: usize,
    pred: &Predictor,
    new: &Forces,
    t_global: f64,
    config: &SimulationConfig,
) -> Result<CorrectedState, &'static str> {
    if !all_finite(&new.a) {
        return Err("acceleration");
    }
    if !all_finite(&new.a1) {
        return Err("jerk");
    }

    let dt = store.steps()[i];
    let old = store.forces(i);
    let c = correct(pred, &old, new, dt);

    if !all_finite(&c.r) {
        return Err("position");
    }
    if !all_finite(&c.v) {
        return Err("velocity");
    }
    if !all_finite(&c.a2) || !all_finite(&c.a3) {
        return Err("acceleration derivative");
    }

    let next = timestep::next_step(dt, t_global, [new.a, new.a1, c.a2, c.a3], config);
    Ok(CorrectedState {
        t: t_global,
        r: Point3::from(c.r),
        v: Vector3::from(c.v),
        a: Vector3::from(new.a),
        j: Vector3::from(new.a1),
        a2: Vector3::from(c.a2),
        a3: Vector3::from(c.a3),
        dt: next,
    })
}

/// Correct every active particle in parallel into `out`, in `active` order.
///
/// Nothing is written to the store; the caller applies `out` afterwards.
pub fn correct_active(
    store: &ParticleStore,
    active: &[u32],
    forces: &[Forces],
    t_global: f64,
    tick: u64,
    config: &SimulationConfig,
    out: &mut Vec<CorrectedState>,
) -> Result<(), HermiteError> {
    let results: Vec<_> = active
        .par_iter()
        .zip(forces.par_iter())
        .map(|(&i, new)| {
            let i = i as usize;
            let pred = predict(&store.device_row(i), t_global);
            correct_particle(store, i, &pred, new, t_global, config)
        })
        .collect();

    out.clear();
    for (&i, result) in active.iter().zip(results) {
        match result {
            Ok(state) => out.push(state),
            Err(quantity) => {
                return Err(HermiteError::NumericalDegeneracy {
                    tick,
                    index: i as usize,
                    quantity,
                });
            }
        }
    }
    Ok(())
}
