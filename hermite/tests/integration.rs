use std::f64::consts::PI;

use cgmath::{InnerSpace, Point3};
use hermite::{
    CpuBackend, ForceBackend, Forces, HermiteError, ParticleInit, ParticleStore, Simulation,
    SimulationConfig, diagnostics::relative_drift, presets, timestep::is_power_of_two,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn simulation(initial: &[ParticleInit], config: SimulationConfig) -> Simulation<CpuBackend> {
    let backend = CpuBackend::new(&config, initial.len()).unwrap();
    Simulation::new(config, initial, backend).unwrap()
}

#[test]
fn kepler_orbit_returns_after_one_period() {
    let config = SimulationConfig {
        softening2: 1e-12,
        eta_n: 1e-4,
        eta_s: 1e-4,
        itime: 2.0 * PI,
        ..Default::default()
    };
    let mut sim = simulation(&presets::two_body_circular(), config);
    sim.run().unwrap();

    let t = sim.t_global();
    assert!(t >= 2.0 * PI);
    let snapshot = sim.snapshot();
    let expected = Point3::new(0.5 * t.cos(), 0.5 * t.sin(), 0.0);
    let err = (snapshot.positions[1] - expected).magnitude() / 0.5;
    assert!(err < 1e-6, "relative position error {err}");
    let mirrored = Point3::new(-expected.x, -expected.y, 0.0);
    let err = (snapshot.positions[0] - mirrored).magnitude() / 0.5;
    assert!(err < 1e-6, "relative position error {err}");
}

#[test]
fn energy_drift_stays_bounded() {
    let config = SimulationConfig {
        softening2: 1e-3,
        itime: 0.5,
        energy_interval: 8,
        ..Default::default()
    };
    let mut sim = simulation(&presets::random_cluster(64, 17), config);
    let e0 = sim.initial_energy().total();

    let mut samples = 0;
    while !sim.is_finished() {
        if let Some(energy) = sim.step().unwrap().energy {
            let drift = relative_drift(e0, energy.total());
            assert!(drift < 1e-3, "drift {drift} at t = {}", sim.t_global());
            samples += 1;
        }
    }
    assert!(samples > 0);
    assert!(sim.summary().drift() < 1e-3);
}

#[test]
fn steps_stay_aligned_powers_of_two() {
    let config = SimulationConfig::default();
    let mut sim = simulation(&presets::random_cluster(50, 3), config.clone());

    for _ in 0..200 {
        sim.step().unwrap();
        let store = sim.store();
        for (&t, &dt) in store.times().iter().zip(store.steps()) {
            assert!(is_power_of_two(dt), "step {dt}");
            assert!(dt >= config.dt_min && dt <= config.dt_max);
            assert_eq!(t % dt, 0.0, "time {t} not a multiple of {dt}");
        }
    }
}

#[test]
fn active_set_is_exactly_the_earliest_block() {
    let mut sim = simulation(&presets::plummer(64, 21), SimulationConfig::default());

    for _ in 0..100 {
        let store = sim.store();
        let t_next = store.next_block_time();
        let expected: Vec<u32> = (0..store.len())
            .filter(|&i| store.times()[i] + store.steps()[i] == t_next)
            .map(|i| i as u32)
            .collect();

        let report = sim.step().unwrap();
        assert_eq!(report.t_global, t_next);
        assert_eq!(report.active, expected.len());
        assert_eq!(sim.last_active(), &expected[..]);
    }
}

#[test]
fn hundred_particles_ten_ticks() {
    let initial = presets::random_cluster(100, 5);
    let mut sim = simulation(&initial, SimulationConfig::default());

    let mut updates = 0;
    let mut last = sim.t_global();
    for tick in 1..=10 {
        let report = sim.step().unwrap();
        assert_eq!(report.tick, tick);
        assert!(report.t_global > last);
        assert!(report.active >= 1);
        last = report.t_global;
        updates += report.active;
    }
    // Mixed steps: the first block must not already cover everyone.
    assert!(sim.store().steps().iter().any(|&dt| dt < SimulationConfig::default().dt_max));
    assert!(updates >= initial.len());
    assert_eq!(sim.summary().updates, updates as u64);
}

#[test]
fn newtons_third_law_for_random_pairs() {
    let mut rng = StdRng::seed_from_u64(99);
    let config = SimulationConfig::default();

    for _ in 0..50 {
        let mut random_particle = || {
            ParticleInit::new(
                rng.random_range(0.01..10.0),
                [
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                ],
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                ],
            )
        };
        let pair = [random_particle(), random_particle()];
        let store = ParticleStore::load(&pair).unwrap();

        let mut backend = CpuBackend::new(&config, 2).unwrap();
        backend.upload(&store).unwrap();
        backend.predict(0.0).unwrap();
        let mut out = [Forces::ZERO; 2];
        backend.compute_forces(&[0, 1], &mut out).unwrap();

        let (m0, m1) = (pair[0].mass as f64, pair[1].mass as f64);
        let norm = |v: [f64; 3]| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        let (acc_scale, jerk_scale) = (m0 * norm(out[0].a), m0 * norm(out[0].a1));
        for k in 0..3 {
            assert!((m0 * out[0].a[k] + m1 * out[1].a[k]).abs() <= 1e-12 * acc_scale);
            assert!((m0 * out[0].a1[k] + m1 * out[1].a1[k]).abs() <= 1e-12 * jerk_scale);
        }
    }
}

#[test]
fn coincident_particles_are_softened() {
    let initial = [
        ParticleInit::new(0.5, [0.25, 0.25, 0.25], [0.0, 0.0, 0.0]),
        ParticleInit::new(0.5, [0.25, 0.25, 0.25], [0.1, 0.0, 0.0]),
        ParticleInit::new(0.1, [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
    ];
    let config = SimulationConfig {
        softening2: 1e-4,
        ..Default::default()
    };
    let mut sim = simulation(&initial, config);
    for &a in sim.store().accelerations() {
        assert!(a.x.is_finite() && a.y.is_finite() && a.z.is_finite());
    }
    for _ in 0..20 {
        sim.step().unwrap();
    }
    assert!(sim.energy().total().is_finite());
}

#[test]
fn backend_mirror_tracks_store() {
    let mut sim = simulation(&presets::random_cluster(40, 8), SimulationConfig::default());
    for _ in 0..25 {
        sim.step().unwrap();
        assert_eq!(sim.backend().bodies(), &sim.store().device_rows()[..]);
    }
}

#[test]
fn invalid_input_is_rejected_before_the_first_tick() {
    let config = SimulationConfig::default();
    let backend = CpuBackend::new(&config, 1).unwrap();
    assert!(matches!(
        Simulation::new(config.clone(), &[], backend),
        Err(HermiteError::EmptySystem)
    ));

    let backend = CpuBackend::new(&config, 1).unwrap();
    let bad = [ParticleInit::new(-1.0, [0.0; 3], [0.0; 3])];
    assert!(matches!(
        Simulation::new(config, &bad, backend),
        Err(HermiteError::InvalidParticle { index: 0, .. })
    ));
}

#[test]
fn boxed_backend_drives_the_same_run() {
    let config = SimulationConfig {
        iterations: 30,
        itime: 100.0,
        ..Default::default()
    };
    let initial = presets::random_cluster(32, 12);

    let mut plain = simulation(&initial, config.clone());
    let boxed: Box<dyn ForceBackend + Send> =
        Box::new(CpuBackend::new(&config, initial.len()).unwrap());
    let mut dynamic = Simulation::new(config, &initial, boxed).unwrap();

    let a = plain.run().unwrap();
    let b = dynamic.run().unwrap();
    assert_eq!(a.ticks, b.ticks);
    assert_eq!(a.t_global, b.t_global);
    assert_eq!(plain.store().positions(), dynamic.store().positions());
}
