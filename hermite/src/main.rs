use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use anyhow::Context;
use hermite::{
    CpuBackend, ForceBackend, GpuBackend, Simulation, SimulationConfig, SnapshotExchange,
    config::override_from_env, presets, run_sim_loop,
};
use log::{info, warn};
use pollster::FutureExt;

const SAMPLE_PERIOD: Duration = Duration::from_millis(500);

fn backend(config: &SimulationConfig, n: usize) -> anyhow::Result<Box<dyn ForceBackend + Send>> {
    let wanted = std::env::var("HERMITE_BACKEND").unwrap_or_default();
    if wanted.eq_ignore_ascii_case("gpu") {
        match GpuBackend::new(config).block_on() {
            Ok(gpu) => {
                info!("Using GPU adapter {}", gpu.adapter_name());
                return Ok(Box::new(gpu));
            }
            Err(e) => warn!("GPU backend unavailable ({e}), falling back to CPU"),
        }
    }
    Ok(Box::new(CpuBackend::new(config, n)?))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SimulationConfig::from_env().context("Failed to read configuration")?;
    let mut n = 1024usize;
    let mut seed = 42u64;
    override_from_env("HERMITE_N", &mut n)?;
    override_from_env("HERMITE_SEED", &mut seed)?;
    // Wall-clock budget in seconds, 0 for none.
    let mut wall_seconds = 0u64;
    override_from_env("HERMITE_WALL_SECONDS", &mut wall_seconds)?;

    let initial = presets::plummer(n, seed);
    let backend = backend(&config, n)?;
    let mut sim = Simulation::new(config, &initial, backend)?;
    info!("Initial structure: {}", sim.structure());

    let exchange = SnapshotExchange::new();
    let token = AtomicBool::new(false);

    let started = Instant::now();

    let summary = std::thread::scope(|s| {
        let handle = s.spawn(|| run_sim_loop(&mut sim, &exchange, &token));

        while !exchange.is_finished() && !handle.is_finished() {
            std::thread::sleep(SAMPLE_PERIOD);
            if let Some(snapshot) = exchange.sample() {
                info!(
                    "tick {} t = {:.4}: {}",
                    snapshot.tick, snapshot.t_global, snapshot.energy
                );
            }
            if wall_seconds > 0 && started.elapsed().as_secs() >= wall_seconds {
                token.store(true, Ordering::Relaxed);
            }
        }
        handle.join()
    })
    .map_err(|_| anyhow::anyhow!("Simulation thread panicked"))??;

    info!("Final structure: {}", sim.structure());
    info!("Done: {summary}");
    Ok(())
}
